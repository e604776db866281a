//! 索引节点
//!
//! 逻辑上 inode 指向一系列数据块：
//! - 直接索引：前 [`DIRECT_COUNT`] 块的编号直接存于 inode；
//! - 一级间接索引：整个块连续存储**块编号**，每个编号都指向一个**数据块**。
//!
//! 二、三级间接索引在磁盘上保留位置，恒为 -1。
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据。

use enumflags2::{BitFlags, bitflags};

use super::OnDisk;
use super::codec::{Decoder, Encoder};
use crate::{DIRECT_COUNT, Error, INODE_NAME_LEN, INODE_SIZE, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum InodeKind {
    #[default]
    Free = 0,
    File = 1,
    Directory = 2,
    Link = 3,
}

impl TryFrom<i32> for InodeKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Free),
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            3 => Ok(Self::Link),
            _ => Err(Error::Corrupt(format!("unknown inode kind {value}"))),
        }
    }
}

/// 权限位：高三位属主，低三位属组，其他人一律无权限
#[rustfmt::skip]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    GroupExec  = 0o01,
    GroupWrite = 0o02,
    GroupRead  = 0o04,
    OwnerExec  = 0o10,
    OwnerWrite = 0o20,
    OwnerRead  = 0o40,
}

impl Perm {
    /// 解析两位八进制数字，如 `"75"`
    pub fn parse(mode: &str) -> Result<BitFlags<Perm>> {
        let invalid = || Error::InvalidPermissions(mode.to_string());

        if mode.len() != 2 || !mode.bytes().all(|c| (b'0'..=b'7').contains(&c)) {
            return Err(invalid());
        }
        let bits = u32::from_str_radix(mode, 8).map_err(|_| invalid())?;

        BitFlags::from_bits(bits).map_err(|_| invalid())
    }

    /// 形如 `rwxr-x`
    pub fn render(perms: BitFlags<Perm>) -> String {
        [
            (Perm::OwnerRead, 'r'),
            (Perm::OwnerWrite, 'w'),
            (Perm::OwnerExec, 'x'),
            (Perm::GroupRead, 'r'),
            (Perm::GroupWrite, 'w'),
            (Perm::GroupExec, 'x'),
        ]
        .into_iter()
        .map(|(flag, c)| if perms.contains(flag) { c } else { '-' })
        .collect()
    }
}

/// 访问类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    #[inline]
    fn owner(self) -> Perm {
        match self {
            Self::Read => Perm::OwnerRead,
            Self::Write => Perm::OwnerWrite,
            Self::Execute => Perm::OwnerExec,
        }
    }

    #[inline]
    fn group(self) -> Perm {
        match self {
            Self::Read => Perm::GroupRead,
            Self::Write => Perm::GroupWrite,
            Self::Execute => Perm::GroupExec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// ID，即在 inode 表中的下标
    pub id: u32,
    pub kind: InodeKind,
    pub perms: BitFlags<Perm>,
    pub uid: u32,
    pub gid: u32,
    /// 文件字节数；目录恒为一块
    pub size: u64,
    /// 硬链接个数
    pub links: u32,
    /// 毫秒时间戳
    pub created_at: i64,
    pub modified_at: i64,
    pub accessed_at: i64,
    pub open: bool,
    /// 仅供展示的名字缓存
    name: String,
    /// 直接索引块
    pub direct: [Option<u32>; DIRECT_COUNT],
    /// 指向一个一级索引块
    pub indirect: Option<u32>,
}

impl DiskInode {
    /// 全新的 inode，时间戳均为 `now`
    pub fn new(
        id: u32,
        kind: InodeKind,
        perms: BitFlags<Perm>,
        uid: u32,
        gid: u32,
        now: i64,
    ) -> Self {
        Self {
            id,
            kind,
            perms,
            uid,
            gid,
            size: 0,
            links: 1,
            created_at: now,
            modified_at: now,
            accessed_at: now,
            open: false,
            name: String::new(),
            direct: [None; DIRECT_COUNT],
            indirect: None,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 超长的名字在字符边界处截断
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(INODE_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = name[..end].to_string();
    }

    #[inline]
    pub fn owner_allows(&self, access: Access) -> bool {
        self.perms.contains(access.owner())
    }

    #[inline]
    pub fn group_allows(&self, access: Access) -> bool {
        self.perms.contains(access.group())
    }
}

impl OnDisk for DiskInode {
    const SIZE: usize = INODE_SIZE;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Self::SIZE);
        enc.put_u32(self.id);
        enc.put_i32(self.kind as i32);
        enc.put_u32(self.perms.bits());
        enc.put_u32(self.uid);
        enc.put_u32(self.gid);
        enc.put_i64(self.size as i64);
        enc.put_u32(self.links);
        enc.put_i64(self.created_at);
        enc.put_i64(self.modified_at);
        enc.put_i64(self.accessed_at);
        enc.put_i32(self.open as i32);
        enc.put_name(&self.name, INODE_NAME_LEN)?;
        for &ptr in &self.direct {
            enc.put_ptr(ptr);
        }
        enc.put_ptr(self.indirect);
        // 二、三级间接索引
        enc.put_ptr(None);
        enc.put_ptr(None);

        Ok(enc.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, Self::SIZE, "inode")?;

        let id = dec.u32("inode id")?;
        let kind = dec.i32().try_into()?;
        let perms = dec.i32();
        let perms = u32::try_from(perms)
            .ok()
            .and_then(|bits| BitFlags::from_bits(bits).ok())
            .ok_or_else(|| Error::Corrupt(format!("invalid permission bits {perms:#o}")))?;
        let uid = dec.u32("uid")?;
        let gid = dec.u32("gid")?;
        let size = dec.i64();
        let size = u64::try_from(size)
            .map_err(|_| Error::Corrupt(format!("negative file size {size}")))?;
        let links = dec.u32("link count")?;
        let created_at = dec.i64();
        let modified_at = dec.i64();
        let accessed_at = dec.i64();
        let open = dec.i32() != 0;
        let name = dec.name(INODE_NAME_LEN)?;
        let mut direct = [None; DIRECT_COUNT];
        for ptr in &mut direct {
            *ptr = dec.ptr();
        }
        let indirect = dec.ptr();

        Ok(Self {
            id,
            kind,
            perms,
            uid,
            gid,
            size,
            links,
            created_at,
            modified_at,
            accessed_at,
            open,
            name,
            direct,
            indirect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiskInode {
        let mut inode = DiskInode::new(
            7,
            InodeKind::File,
            BitFlags::from_bits(0o64).unwrap(),
            3,
            1,
            1_700_000_000_000,
        );
        inode.set_name("notes.txt");
        inode.size = 3 * 4096 + 17;
        inode.links = 2;
        inode.open = true;
        inode.direct[0] = Some(70);
        inode.direct[1] = Some(71);
        inode.direct[11] = Some(4000);
        inode.indirect = Some(90);
        inode
    }

    #[test]
    fn round_trip() {
        let inode = sample();
        let bytes = inode.encode().unwrap();
        assert_eq!(bytes.len(), INODE_SIZE);
        assert_eq!(DiskInode::decode(&bytes).unwrap(), inode);
    }

    #[test]
    fn unused_pointers_are_minus_one() {
        let bytes = sample().encode().unwrap();
        // direct[2] 位于 124 + 8 字节处
        assert_eq!(&bytes[132..136], &(-1i32).to_be_bytes());
        // 二、三级间接索引
        assert_eq!(&bytes[176..184], &[0xFF; 8]);
        assert!(bytes[184..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unknown_kind_is_corrupt() {
        let mut bytes = sample().encode().unwrap();
        bytes[4..8].copy_from_slice(&9i32.to_be_bytes());
        assert!(matches!(DiskInode::decode(&bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn cached_name_is_cut_at_a_char_boundary() {
        let mut inode = sample();
        inode.set_name(&"é".repeat(40));
        assert_eq!(inode.name().len(), 64);
        inode.set_name(&format!("a{}", "é".repeat(40)));
        assert_eq!(inode.name().len(), 63);
        assert!(inode.encode().is_ok());
    }

    #[test]
    fn permission_checks() {
        let inode = sample();
        // 0o64: rw-r--
        assert!(inode.owner_allows(Access::Read));
        assert!(inode.owner_allows(Access::Write));
        assert!(!inode.owner_allows(Access::Execute));
        assert!(inode.group_allows(Access::Read));
        assert!(!inode.group_allows(Access::Write));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(Perm::parse("75").unwrap().bits(), 0o75);
        assert_eq!(Perm::parse("00").unwrap(), BitFlags::empty());
        for bad in ["", "7", "755", "78", "x5", "-1"] {
            assert!(matches!(Perm::parse(bad), Err(Error::InvalidPermissions(_))));
        }
        assert_eq!(Perm::render(Perm::parse("75").unwrap()), "rwxr-x");
    }
}
