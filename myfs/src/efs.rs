//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：格式化与挂载、inode 与数据块的分配回收、
//! 逻辑块映射，以及文件内容与目录项的整体读写。
//!
//! 位图与超级块常驻内存，每次分配或回收都同步写回磁盘。

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, BlockFile};
use enumflags2::BitFlags;
use spin::Mutex;

use crate::layout::*;
use crate::{
    BYTES_PER_INODE, DEFAULT_DIR_PERMS, DIR_ENTRY_SIZE, DIRECT_COUNT, Error, FS_NAME, FS_VERSION,
    GROUP_TABLE_BLOCK, INODE_SIZE, ROOT_GID, ROOT_INODE, ROOT_UID, Result, USER_TABLE_BLOCK,
};

/// 本进程内已挂载的卷，同一后备文件只允许一个句柄
static MOUNTED: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// 根用户的家目录，由格式化建立
const ROOT_HOME: &str = "/user/root/home";
/// 格式化时建立的目录链，逐级嵌套于根目录之下
const BOOTSTRAP_DIRS: [&str; 3] = ["user", "root", "home"];

/// 格式化参数
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// 卷大小，单位 MiB
    pub size_mb: u32,
    /// 块大小，单位 KiB
    pub block_size_kb: u32,
    pub password: String,
    /// 必须与 `password` 一致
    pub confirm: String,
    pub name: String,
}

impl FormatOptions {
    pub fn new(size_mb: u32, block_size_kb: u32, password: &str) -> Self {
        Self {
            size_mb,
            block_size_kb,
            password: password.to_string(),
            confirm: password.to_string(),
            name: FS_NAME.to_string(),
        }
    }

    fn check_password(&self) -> Result<()> {
        if self.password != self.confirm {
            return Err(Error::PasswordMismatch);
        }
        if self.password.trim().is_empty() {
            return Err(Error::EmptyPassword);
        }

        Ok(())
    }
}

/// 各区域的块数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    block_size: u32,
    total_blocks: u32,
    total_inodes: u32,
    inode_bitmap_blocks: u32,
    inode_table_blocks: u32,
    data_bitmap_blocks: u32,
    data_blocks: u32,
}

impl Geometry {
    fn compute(total_bytes: u64, block_size: u32) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidGeometry(why.to_string());

        if !block_size_fits(block_size) {
            return Err(invalid("block size must be at least 1 KiB and a multiple of 256 bytes"));
        }
        let bs = block_size as u64;
        let total_blocks = total_bytes / bs;
        let total_inodes = total_bytes / BYTES_PER_INODE;
        if total_blocks > i32::MAX as u64 || total_inodes > i32::MAX as u64 {
            return Err(invalid("volume too large"));
        }
        if total_inodes < 4 {
            return Err(invalid("volume too small for the bootstrap directories"));
        }

        let inode_bitmap_blocks = Bitmap::blocks(total_inodes as usize, bs as usize) as u64;
        let inode_table_blocks = (total_inodes * INODE_SIZE as u64).div_ceil(bs);
        // 先按不含数据位图估算数据块数，再据此确定数据位图的大小
        let provisional = total_blocks
            .checked_sub(1 + inode_bitmap_blocks + inode_table_blocks)
            .ok_or_else(|| invalid("metadata does not fit"))?;
        let data_bitmap_blocks = Bitmap::blocks(provisional as usize, bs as usize) as u64;
        let data_blocks = provisional
            .checked_sub(data_bitmap_blocks)
            .filter(|&blocks| blocks > GROUP_TABLE_BLOCK as u64)
            .ok_or_else(|| invalid("volume too small for the bootstrap data blocks"))?;

        Ok(Self {
            block_size,
            total_blocks: total_blocks as u32,
            total_inodes: total_inodes as u32,
            inode_bitmap_blocks: inode_bitmap_blocks as u32,
            inode_table_blocks: inode_table_blocks as u32,
            data_bitmap_blocks: data_bitmap_blocks as u32,
            data_blocks: data_blocks as u32,
        })
    }

    fn super_block(&self, name: &str, now: i64) -> SuperBlock {
        let inode_bitmap_start = 1;
        let data_bitmap_start = inode_bitmap_start + self.inode_bitmap_blocks;
        let inode_table_start = data_bitmap_start + self.data_bitmap_blocks;
        let data_blocks_start = inode_table_start + self.inode_table_blocks;

        SuperBlock {
            name: name.to_string(),
            version: FS_VERSION,
            block_size: self.block_size,
            total_blocks: self.total_blocks,
            total_inodes: self.total_inodes,
            free_blocks: self.data_blocks,
            free_inodes: self.total_inodes,
            root_inode: ROOT_INODE,
            allocation: AllocStrategy::Indexed,
            inode_bitmap_start,
            data_bitmap_start,
            inode_table_start,
            data_blocks_start,
            created_at: now,
            mounted_at: now,
        }
    }
}

/// 至少容纳超级块以及目录的 `.` 与 `..`，且 inode 与目录项不跨块
fn block_size_fits(block_size: u32) -> bool {
    let block_size = block_size as usize;
    block_size >= 4 * DIR_ENTRY_SIZE
        && block_size % INODE_SIZE == 0
        && block_size % DIR_ENTRY_SIZE == 0
}

/// 占用登记表中的一个位置，析构时归还
#[derive(Debug)]
struct MountGuard(PathBuf);

impl MountGuard {
    fn acquire(path: &Path) -> Result<Self> {
        let key = registry_key(path)?;
        let mut mounted = MOUNTED.lock();
        if mounted.contains(&key) {
            return Err(Error::AlreadyMounted(key));
        }
        mounted.push(key.clone());

        Ok(Self(key))
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        MOUNTED.lock().retain(|path| path != &self.0);
    }
}

/// 尚不存在的文件以其父目录的规范路径拼接文件名
fn registry_key(path: &Path) -> io::Result<PathBuf> {
    if let Ok(key) = fs::canonicalize(path) {
        return Ok(key);
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a file path"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    Ok(fs::canonicalize(parent)?.join(file_name))
}

/// 连续读出若干块
fn read_region(device: &dyn BlockDevice, start: u32, blocks: u32) -> Result<Vec<u8>> {
    let block_size = device.block_size();
    let mut bytes = vec![0; blocks as usize * block_size];
    for (index, block) in bytes.chunks_exact_mut(block_size).enumerate() {
        device.read_block(start as usize + index, block)?;
    }

    Ok(bytes)
}

/// 毫秒时间戳
pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total: u32,
    pub free: u32,
    pub used: u32,
}

impl Usage {
    #[inline]
    fn new(total: u32, free: u32) -> Self {
        Self {
            total,
            free,
            used: total - free,
        }
    }
}

/// 卷的概要信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    pub name: String,
    pub version: i32,
    pub block_size: u32,
    pub allocation: AllocStrategy,
    pub inodes: Usage,
    pub blocks: Usage,
    pub created_at: i64,
    pub mounted_at: i64,
    pub users: usize,
    pub groups: usize,
}

/// 一个已挂载的卷。
///
/// 独占超级块、两张位图与后备文件句柄；inode 与目录项每次都从磁盘重新解码。
pub struct FileSystem {
    device: Arc<dyn BlockDevice>,
    path: PathBuf,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    accounts: AccountTable,
    /// 规范化路径 -> 打开时的 inode
    open_files: BTreeMap<String, DiskInode>,
    _guard: MountGuard,
}

impl FileSystem {
    /// 在 `path` 上建立新卷并返回已挂载的句柄。已有文件会被截断重写。
    pub fn format(path: impl AsRef<Path>, options: &FormatOptions) -> Result<Self> {
        let path = path.as_ref();
        options.check_password()?;

        let total_bytes = options.size_mb as u64 * 1024 * 1024;
        let geometry = Geometry::compute(total_bytes, options.block_size_kb.saturating_mul(1024))?;
        let super_block = geometry.super_block(&options.name, now());
        // 卷名过长时在动文件之前失败
        super_block.encode()?;

        let guard = MountGuard::acquire(path)?;
        log::info!(
            "formatting {}: {} blocks of {} bytes, {} inodes, {} data blocks",
            path.display(),
            geometry.total_blocks,
            geometry.block_size,
            geometry.total_inodes,
            geometry.data_blocks,
        );
        let device = BlockFile::create(path, total_bytes, geometry.block_size as usize)?;

        let mut fs = Self {
            device: Arc::new(device),
            path: path.to_path_buf(),
            inode_bitmap: Bitmap::new(geometry.total_inodes as usize),
            data_bitmap: Bitmap::new(geometry.data_blocks as usize),
            super_block,
            accounts: AccountTable::bootstrap(&options.password, ROOT_HOME),
            open_files: BTreeMap::new(),
            _guard: guard,
        };
        fs.write_super_block()?;
        fs.write_bitmap(fs.super_block.inode_bitmap_start, &fs.inode_bitmap)?;
        fs.write_bitmap(fs.super_block.data_bitmap_start, &fs.data_bitmap)?;

        fs.bootstrap()?;
        fs.sync()?;

        Ok(fs)
    }

    /// 根目录及其下的 `/user/root/home`，再加上两块账户表
    fn bootstrap(&mut self) -> Result<()> {
        let mut parent = self.new_directory(None, "/", ROOT_UID, ROOT_GID)?;
        for name in BOOTSTRAP_DIRS {
            let child = self.new_directory(Some(parent.id), name, ROOT_UID, ROOT_GID)?;
            parent.links += 1;
            self.add_entry(&mut parent, DirEntry::new(name, child.id, InodeKind::Directory))?;
            parent = child;
        }

        self.claim_data_block(USER_TABLE_BLOCK)?;
        self.claim_data_block(GROUP_TABLE_BLOCK)?;
        self.save_accounts()
    }

    /// 挂载已有的卷
    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let guard = MountGuard::acquire(path)?;

        let header = BlockFile::read_header(path, SuperBlock::SIZE).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidVolume("file too short for a superblock".to_string())
            } else {
                err.into()
            }
        })?;
        let mut super_block = SuperBlock::decode(&header).map_err(|err| match err {
            Error::Corrupt(why) => Error::InvalidVolume(why),
            err => err,
        })?;
        if !block_size_fits(super_block.block_size) || !super_block.is_consistent() {
            return Err(Error::InvalidVolume("inconsistent superblock".to_string()));
        }

        let block_size = super_block.block_size as usize;
        let device = BlockFile::open(path, block_size)?;
        if device.len()? < super_block.total_blocks as u64 * block_size as u64 {
            return Err(Error::InvalidVolume("backing file is truncated".to_string()));
        }
        let device: Arc<dyn BlockDevice> = Arc::new(device);

        let inode_bitmap = Bitmap::from_bytes(
            &read_region(&*device, super_block.inode_bitmap_start, super_block.inode_bitmap_blocks())?,
            super_block.total_inodes as usize,
        );
        let data_bitmap = Bitmap::from_bytes(
            &read_region(&*device, super_block.data_bitmap_start, super_block.data_bitmap_blocks())?,
            super_block.data_blocks() as usize,
        );
        let data_start = super_block.data_blocks_start;
        let accounts = AccountTable::decode(
            &read_region(&*device, data_start + USER_TABLE_BLOCK, 1)?,
            &read_region(&*device, data_start + GROUP_TABLE_BLOCK, 1)?,
        )?;

        let free_inodes = inode_bitmap.count_free() as u32;
        let free_blocks = data_bitmap.count_free() as u32;
        if (free_inodes, free_blocks) != (super_block.free_inodes, super_block.free_blocks) {
            log::warn!(
                "free counters ({}, {}) disagree with bitmaps ({free_inodes}, {free_blocks})",
                super_block.free_inodes,
                super_block.free_blocks,
            );
        }
        super_block.free_inodes = free_inodes;
        super_block.free_blocks = free_blocks;
        super_block.mounted_at = now();

        let fs = Self {
            device,
            path: path.to_path_buf(),
            super_block,
            inode_bitmap,
            data_bitmap,
            accounts,
            open_files: BTreeMap::new(),
            _guard: guard,
        };
        fs.write_super_block()?;

        log::info!(
            "mounted {} ({} bytes per block, {} free blocks, {} free inodes)",
            path.display(),
            block_size,
            free_blocks,
            free_inodes,
        );
        Ok(fs)
    }

    /// 写回账户表与元数据并关闭后备文件
    pub fn unmount(mut self) -> Result<()> {
        for (path, inode) in std::mem::take(&mut self.open_files) {
            log::debug!("closing {path} on unmount");
            let mut inode = self.read_inode(inode.id)?;
            inode.open = false;
            self.write_inode(&inode)?;
        }
        self.sync()?;

        log::info!("unmounted {}", self.path.display());
        Ok(())
    }

    /// 写回超级块、两张位图与账户表
    pub fn sync(&mut self) -> Result<()> {
        self.write_super_block()?;
        self.write_bitmap(self.super_block.inode_bitmap_start, &self.inode_bitmap)?;
        self.write_bitmap(self.super_block.data_bitmap_start, &self.data_bitmap)?;
        self.save_accounts()?;
        self.device.flush()?;

        Ok(())
    }
}

// 查询
impl FileSystem {
    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.super_block.block_size as usize
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }

    #[inline]
    pub fn inode_usage(&self) -> Usage {
        Usage::new(self.super_block.total_inodes, self.super_block.free_inodes)
    }

    #[inline]
    pub fn block_usage(&self) -> Usage {
        Usage::new(self.super_block.data_blocks(), self.super_block.free_blocks)
    }

    pub fn info(&self) -> FsInfo {
        let sb = &self.super_block;
        FsInfo {
            name: sb.name.clone(),
            version: sb.version,
            block_size: sb.block_size,
            allocation: sb.allocation,
            inodes: self.inode_usage(),
            blocks: self.block_usage(),
            created_at: sb.created_at,
            mounted_at: sb.mounted_at,
            users: self.accounts.users().count(),
            groups: self.accounts.groups().count(),
        }
    }

    #[inline]
    pub fn accounts(&self) -> &AccountTable {
        &self.accounts
    }

    /// 修改在 [`FileSystem::sync`] 或卸载时落盘
    #[inline]
    pub fn accounts_mut(&mut self) -> &mut AccountTable {
        &mut self.accounts
    }

    /// 每个目录可容纳的目录项数
    #[inline]
    pub fn entries_per_block(&self) -> usize {
        self.block_size() / DIR_ENTRY_SIZE
    }

    /// 一级间接索引块的编号容量
    #[inline]
    fn pointers_per_block(&self) -> usize {
        self.block_size() / 4
    }

    /// 单个文件最多占用的数据块数
    #[inline]
    pub fn max_file_blocks(&self) -> usize {
        DIRECT_COUNT + self.pointers_per_block()
    }
}

// 打开文件表
impl FileSystem {
    pub fn open_file(&mut self, path: &str, inode: DiskInode) {
        self.open_files.insert(path.to_string(), inode);
    }

    pub fn close_file(&mut self, path: &str) -> Option<DiskInode> {
        self.open_files.remove(path)
    }

    /// 回收 inode 时一并移除指向它的表项
    pub fn close_inode(&mut self, id: u32) {
        self.open_files.retain(|_, inode| inode.id != id);
    }

    /// 路径改变后迁移表项；`from` 是目录时，其下的表项一并迁移
    pub fn rename_open(&mut self, from: &str, to: &str) {
        let moved: Vec<String> = self
            .open_files
            .keys()
            .filter(|key| {
                key.strip_prefix(from)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .cloned()
            .collect();

        for key in moved {
            if let Some(inode) = self.open_files.remove(&key) {
                let renamed = format!("{to}{}", &key[from.len()..]);
                log::trace!("open-file entry {key} -> {renamed}");
                self.open_files.insert(renamed, inode);
            }
        }
    }

    #[inline]
    pub fn is_open(&self, path: &str) -> bool {
        self.open_files.contains_key(path)
    }

    pub fn open_files(&self) -> impl Iterator<Item = (&str, &DiskInode)> {
        self.open_files
            .iter()
            .map(|(path, inode)| (path.as_str(), inode))
    }
}

// 分配与回收
impl FileSystem {
    /// 在磁盘上分配新的 inode 并返回其ID
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let index = self.inode_bitmap.alloc().ok_or(Error::NoFreeInode)?;
        self.super_block.free_inodes -= 1;
        self.persist_bitmap_bit(self.super_block.inode_bitmap_start, &self.inode_bitmap, index)?;

        log::debug!("alloc inode {index}");
        Ok(index as u32)
    }

    /// 只翻转位图，不清零 inode 记录
    pub fn free_inode(&mut self, id: u32) -> Result<()> {
        if !self.inode_bitmap.clear(id as usize) {
            log::debug!("inode {id} is not allocated, ignored");
            return Ok(());
        }
        self.super_block.free_inodes += 1;
        self.persist_bitmap_bit(self.super_block.inode_bitmap_start, &self.inode_bitmap, id as usize)?;

        log::debug!("free inode {id}");
        Ok(())
    }

    /// 在磁盘上分配新的数据块并返回其绝对块号
    pub fn alloc_data_block(&mut self) -> Result<u32> {
        let index = self.data_bitmap.alloc().ok_or(Error::NoFreeBlock)?;
        self.super_block.free_blocks -= 1;
        self.persist_bitmap_bit(self.super_block.data_bitmap_start, &self.data_bitmap, index)?;

        let block_id = self.super_block.data_blocks_start + index as u32;
        log::debug!("alloc data block {block_id}");
        Ok(block_id)
    }

    /// 数据区以外或未分配的块被忽略
    pub fn free_data_block(&mut self, block_id: u32) -> Result<()> {
        let Some(index) = block_id.checked_sub(self.super_block.data_blocks_start) else {
            log::debug!("block {block_id} is outside the data region, ignored");
            return Ok(());
        };
        if !self.data_bitmap.clear(index as usize) {
            log::debug!("data block {block_id} is not allocated, ignored");
            return Ok(());
        }
        self.super_block.free_blocks += 1;
        self.persist_bitmap_bit(self.super_block.data_bitmap_start, &self.data_bitmap, index as usize)?;

        log::debug!("free data block {block_id}");
        Ok(())
    }

    /// 占用数据区内指定下标的块
    fn claim_data_block(&mut self, index: u32) -> Result<()> {
        if self.data_bitmap.set(index as usize) {
            self.super_block.free_blocks -= 1;
            self.persist_bitmap_bit(self.super_block.data_bitmap_start, &self.data_bitmap, index as usize)?;
        }

        Ok(())
    }

    /// 分配并写入一个全新的 inode
    pub fn new_inode(
        &mut self,
        kind: InodeKind,
        perms: BitFlags<Perm>,
        uid: u32,
        gid: u32,
    ) -> Result<DiskInode> {
        let id = self.alloc_inode()?;
        let inode = DiskInode::new(id, kind, perms, uid, gid, now());
        self.write_inode(&inode)?;

        Ok(inode)
    }

    /// 新建目录：一个 inode、一个数据块，以及 `.` 与 `..`。
    ///
    /// `parent` 为空表示根目录，其 `..` 指向自身。调用者负责把它挂入父目录。
    pub fn new_directory(
        &mut self,
        parent: Option<u32>,
        name: &str,
        uid: u32,
        gid: u32,
    ) -> Result<DiskInode> {
        let perms = BitFlags::from_bits_truncate(DEFAULT_DIR_PERMS);
        let mut dir = self.new_inode(InodeKind::Directory, perms, uid, gid)?;
        dir.set_name(name);
        dir.links = 2;

        let entries = [
            DirEntry::new(".", dir.id, InodeKind::Directory),
            DirEntry::new("..", parent.unwrap_or(dir.id), InodeKind::Directory),
        ];
        if let Err(err) = self.write_dir(&mut dir, &entries) {
            self.free_inode(dir.id)?;
            return Err(err);
        }

        log::debug!("new directory {name} (inode {})", dir.id);
        Ok(dir)
    }

    /// 释放 inode 的全部数据块（含间接索引块），指针复位并写回 inode
    pub fn release_inode_blocks(&mut self, inode: &mut DiskInode) -> Result<()> {
        for slot in inode.direct.iter_mut() {
            if let Some(block_id) = slot.take() {
                self.free_data_block(block_id)?;
            }
        }
        if let Some(indirect) = inode.indirect.take() {
            for block_id in self.read_pointers(indirect)?.into_iter().flatten() {
                self.free_data_block(block_id)?;
            }
            self.free_data_block(indirect)?;
        }

        self.write_inode(inode)
    }
}

// 逻辑块映射
impl FileSystem {
    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 返回其绝对块号；未设置或超出范围时返回空
    pub fn block_id(&self, inode: &DiskInode, index: usize) -> Result<Option<u32>> {
        if index < DIRECT_COUNT {
            return Ok(inode.direct[index]);
        }
        let index = index - DIRECT_COUNT;
        if index >= self.pointers_per_block() {
            return Ok(None);
        }

        match inode.indirect {
            Some(indirect) => Ok(self.read_pointers(indirect)?[index]),
            None => Ok(None),
        }
    }

    /// 首次用到间接索引时分配索引块并全部置为 -1
    fn set_block_id(&mut self, inode: &mut DiskInode, index: usize, block_id: u32) -> Result<()> {
        if index < DIRECT_COUNT {
            inode.direct[index] = Some(block_id);
            return Ok(());
        }
        let index = index - DIRECT_COUNT;
        if index >= self.pointers_per_block() {
            return Err(Error::FileTooLarge(
                ((DIRECT_COUNT + index + 1) * self.block_size()) as u64,
            ));
        }

        let indirect = match inode.indirect {
            Some(indirect) => indirect,
            None => {
                let indirect = self.alloc_data_block()?;
                self.write_pointers(indirect, &vec![None; self.pointers_per_block()])?;
                inode.indirect = Some(indirect);
                indirect
            }
        };
        let mut pointers = self.read_pointers(indirect)?;
        pointers[index] = Some(block_id);
        self.write_pointers(indirect, &pointers)
    }

    /// 间接索引块中登记的数据块
    pub fn indirect_pointers(&self, inode: &DiskInode) -> Result<Vec<u32>> {
        match inode.indirect {
            Some(indirect) => Ok(self.read_pointers(indirect)?.into_iter().flatten().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// inode 占用的全部数据块，按直接、间接的顺序；不含间接索引块本身
    pub fn allocated_blocks(&self, inode: &DiskInode) -> Result<Vec<u32>> {
        let mut blocks: Vec<u32> = inode.direct.iter().flatten().copied().collect();
        blocks.extend(self.indirect_pointers(inode)?);

        Ok(blocks)
    }

    fn read_pointers(&self, block_id: u32) -> Result<Vec<Option<u32>>> {
        Ok(self
            .read_block(block_id)?
            .chunks_exact(4)
            .map(|raw| {
                let ptr = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                u32::try_from(ptr).ok()
            })
            .collect())
    }

    fn write_pointers(&self, block_id: u32, pointers: &[Option<u32>]) -> Result<()> {
        let block: Vec<u8> = pointers
            .iter()
            .flat_map(|ptr| ptr.map_or(-1, |id| id as i32).to_be_bytes())
            .collect();

        self.write_block(block_id, &block)
    }
}

// 文件内容
impl FileSystem {
    /// 读出整个文件。指针链意外中断时返回已读到的部分
    pub fn read_file(&self, inode: &DiskInode) -> Result<Vec<u8>> {
        let block_size = self.block_size();
        let size = inode.size as usize;
        let mut data = Vec::with_capacity(size);

        for index in 0..size.div_ceil(block_size) {
            let Some(block_id) = self.block_id(inode, index)? else {
                log::warn!("inode {} is missing block {index}, read truncated", inode.id);
                break;
            };
            let block = self.read_block(block_id)?;
            let len = (size - index * block_size).min(block_size);
            data.extend_from_slice(&block[..len]);
        }

        Ok(data)
    }

    /// 整体覆盖写：先释放旧块，再按序分配写入
    pub fn write_file(&mut self, inode: &mut DiskInode, data: &[u8]) -> Result<()> {
        let block_size = self.block_size();
        let needed = data.len().div_ceil(block_size);
        if needed > self.max_file_blocks() {
            return Err(Error::FileTooLarge(data.len() as u64));
        }

        // 释放旧块之前先确认空间足够
        let held = self.allocated_blocks(inode)?.len() + usize::from(inode.indirect.is_some());
        let wanted = needed + usize::from(needed > DIRECT_COUNT);
        if wanted > self.super_block.free_blocks as usize + held {
            return Err(Error::NoFreeBlock);
        }

        self.release_inode_blocks(inode)?;
        for (index, chunk) in data.chunks(block_size).enumerate() {
            let block_id = self.alloc_data_block()?;
            self.write_block(block_id, chunk)?;
            self.set_block_id(inode, index, block_id)?;
        }

        inode.size = data.len() as u64;
        inode.modified_at = now();
        self.write_inode(inode)?;

        log::debug!("wrote {} bytes to inode {}", data.len(), inode.id);
        Ok(())
    }
}

// 目录项
impl FileSystem {
    /// 目录数据块中的全部槽位，包括空闲的
    pub fn read_dir(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir.name().to_string()));
        }
        let Some(block_id) = dir.direct[0] else {
            return Ok(Vec::new());
        };

        self.read_block(block_id)?
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(DirEntry::decode)
            .collect()
    }

    /// 覆盖写目录数据块，其余槽位置空；必要时为目录分配数据块
    pub fn write_dir(&mut self, dir: &mut DiskInode, entries: &[DirEntry]) -> Result<()> {
        if entries.len() > self.entries_per_block() {
            return Err(Error::DirectoryFull(dir.name().to_string()));
        }

        let mut block = Vec::with_capacity(self.block_size());
        for entry in entries {
            block.extend(entry.encode()?);
        }
        let empty = DirEntry::EMPTY.encode()?;
        while block.len() < self.block_size() {
            block.extend_from_slice(&empty);
        }

        let block_id = match dir.direct[0] {
            Some(block_id) => block_id,
            None => {
                let block_id = self.alloc_data_block()?;
                dir.direct[0] = Some(block_id);
                dir.size = self.block_size() as u64;
                block_id
            }
        };
        self.write_block(block_id, &block)?;

        dir.modified_at = now();
        self.write_inode(dir)
    }

    /// 在 `dir` 中按名查找
    pub fn lookup(&self, dir: &DiskInode, name: &str) -> Result<Option<DirEntry>> {
        Ok(self
            .read_dir(dir)?
            .into_iter()
            .find(|entry| !entry.is_free() && entry.name() == name))
    }

    /// 写入首个空闲槽位
    pub fn add_entry(&mut self, dir: &mut DiskInode, entry: DirEntry) -> Result<()> {
        let mut entries = self.read_dir(dir)?;
        entries.resize(self.entries_per_block(), DirEntry::EMPTY);

        let slot = entries
            .iter_mut()
            .find(|slot| slot.is_free())
            .ok_or_else(|| Error::DirectoryFull(dir.name().to_string()))?;
        log::debug!("link {} -> inode {:?} in {}", entry.name(), entry.inode_id(), dir.id);
        *slot = entry;

        self.write_dir(dir, &entries)
    }

    /// 清空名为 `name` 的槽位并返回原目录项
    pub fn remove_entry(&mut self, dir: &mut DiskInode, name: &str) -> Result<Option<DirEntry>> {
        let mut entries = self.read_dir(dir)?;
        let Some(slot) = entries
            .iter_mut()
            .find(|slot| !slot.is_free() && slot.name() == name)
        else {
            return Ok(None);
        };
        let removed = std::mem::replace(slot, DirEntry::EMPTY);
        log::debug!("unlink {name} from {}", dir.id);

        self.write_dir(dir, &entries)?;
        Ok(Some(removed))
    }
}

// 磁盘读写
impl FileSystem {
    fn read_block(&self, block_id: u32) -> Result<Vec<u8>> {
        let mut block = vec![0; self.block_size()];
        self.device.read_block(block_id as usize, &mut block)?;

        Ok(block)
    }

    /// 不足一块的部分以 0 补齐
    fn write_block(&self, block_id: u32, data: &[u8]) -> Result<()> {
        if data.len() == self.block_size() {
            self.device.write_block(block_id as usize, data)?;
        } else {
            let mut block = data.to_vec();
            block.resize(self.block_size(), 0);
            self.device.write_block(block_id as usize, &block)?;
        }

        Ok(())
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    fn inode_pos(&self, id: u32) -> (u32, usize) {
        let byte = id as usize * INODE_SIZE;
        let block_id = self.super_block.inode_table_start + (byte / self.block_size()) as u32;

        (block_id, byte % self.block_size())
    }

    pub fn read_inode(&self, id: u32) -> Result<DiskInode> {
        if id >= self.super_block.total_inodes {
            return Err(Error::Corrupt(format!("inode {id} out of range")));
        }
        let (block_id, offset) = self.inode_pos(id);
        let block = self.read_block(block_id)?;

        DiskInode::decode(&block[offset..offset + INODE_SIZE])
    }

    pub fn write_inode(&self, inode: &DiskInode) -> Result<()> {
        if inode.id >= self.super_block.total_inodes {
            return Err(Error::Corrupt(format!("inode {} out of range", inode.id)));
        }
        let (block_id, offset) = self.inode_pos(inode.id);
        let mut block = self.read_block(block_id)?;
        block[offset..offset + INODE_SIZE].copy_from_slice(&inode.encode()?);

        self.write_block(block_id, &block)
    }

    fn write_super_block(&self) -> Result<()> {
        self.write_block(0, &self.super_block.encode()?)
    }

    fn write_bitmap(&self, start: u32, bitmap: &Bitmap) -> Result<()> {
        for (index, chunk) in bitmap.to_bytes().chunks(self.block_size()).enumerate() {
            self.write_block(start + index as u32, chunk)?;
        }

        Ok(())
    }

    /// 同步写回位 `index` 所在的位图块与超级块
    fn persist_bitmap_bit(&self, start: u32, bitmap: &Bitmap, index: usize) -> Result<()> {
        let block_size = self.block_size();
        let block_index = index / 8 / block_size;
        let bytes = bitmap.to_bytes();
        let begin = block_index * block_size;
        let end = (begin + block_size).min(bytes.len());

        self.write_block(start + block_index as u32, &bytes[begin..end])?;
        self.write_super_block()
    }

    fn save_accounts(&self) -> Result<()> {
        let start = self.super_block.data_blocks_start;
        self.write_block(
            start + USER_TABLE_BLOCK,
            &self.accounts.encode_users(self.block_size())?,
        )?;
        self.write_block(
            start + GROUP_TABLE_BLOCK,
            &self.accounts.encode_groups(self.block_size())?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_of_16_mib_with_4_kib_blocks() {
        let geometry = Geometry::compute(16 * 1024 * 1024, 4096).unwrap();
        assert_eq!(geometry.total_blocks, 4096);
        assert_eq!(geometry.total_inodes, 1024);
        assert_eq!(geometry.inode_bitmap_blocks, 1);
        assert_eq!(geometry.inode_table_blocks, 64);
        assert_eq!(geometry.data_bitmap_blocks, 1);
        assert_eq!(geometry.data_blocks, 4029);

        let sb = geometry.super_block("myFS", 0);
        assert_eq!(sb.data_bitmap_start, 2);
        assert_eq!(sb.inode_table_start, 3);
        assert_eq!(sb.data_blocks_start, 67);
        assert!(sb.is_consistent());
    }

    #[test]
    fn geometry_rejects_unusable_volumes() {
        assert!(matches!(
            Geometry::compute(16 * 1024 * 1024, 512),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            Geometry::compute(32 * 1024, 1024),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(Geometry::compute(1024 * 1024, 1024).is_ok());
    }

    #[test]
    fn password_confirmation() {
        let mut options = FormatOptions::new(1, 1, "pw");
        assert!(options.check_password().is_ok());
        options.confirm = "other".to_string();
        assert!(matches!(options.check_password(), Err(Error::PasswordMismatch)));
        let options = FormatOptions::new(1, 1, "  ");
        assert!(matches!(options.check_password(), Err(Error::EmptyPassword)));
    }

    #[test]
    fn registry_key_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.img");
        let key = registry_key(&path).unwrap();
        assert_eq!(key, fs::canonicalize(dir.path()).unwrap().join("new.img"));
    }
}
