//! # 目录树层
//!
//! 在磁盘块管理器之上以路径为单位操作文件：
//! 解析、创建、删除、移动、硬链接与查找。

mod attr;
mod mutate;
mod path;

use crate::efs::{FileSystem, FsInfo};
use crate::layout::{Access, DirEntry, DiskInode};
use crate::{Error, ROOT_GID, ROOT_UID, Result};

pub use self::attr::{FileStat, Listing};
use self::path::Path;

/// 当前用户的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub const ROOT: Self = Self {
        uid: ROOT_UID,
        gid: ROOT_GID,
    };
}

/// 已挂载卷上的一次会话：卷、当前用户与工作目录
pub struct DirectoryTree {
    fs: FileSystem,
    user: Credentials,
    /// 规范化的绝对路径
    cwd: String,
}

impl DirectoryTree {
    /// 以 root 身份、在根目录下开始
    pub fn new(fs: FileSystem) -> Self {
        Self {
            fs,
            user: Credentials::ROOT,
            cwd: String::from("/"),
        }
    }

    #[inline]
    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    #[inline]
    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    #[inline]
    pub fn into_inner(self) -> FileSystem {
        self.fs
    }

    pub fn unmount(self) -> Result<()> {
        self.fs.unmount()
    }

    #[inline]
    pub fn usage(&self) -> FsInfo {
        self.fs.info()
    }
}

// 会话
impl DirectoryTree {
    #[inline]
    pub fn user(&self) -> Credentials {
        self.user
    }

    /// 切换用户，并进入其家目录（若存在）
    pub fn login(&mut self, name: &str) -> Result<()> {
        let user = self
            .fs
            .accounts()
            .user_by_name(name)
            .ok_or_else(|| Error::NoSuchAccount(name.to_string()))?;
        let home = user.home.clone();
        self.user = Credentials {
            uid: user.uid,
            gid: user.gid,
        };

        self.cwd = String::from("/");
        if self.resolve_inode(&home).is_ok_and(|inode| inode.is_dir()) {
            self.cwd = home.canonicalize("/");
        }
        log::info!("logged in as {name}, cwd {}", self.cwd);
        Ok(())
    }

    pub fn set_user(&mut self, uid: u32) -> Result<()> {
        let user = self
            .fs
            .accounts()
            .user(uid)
            .ok_or_else(|| Error::NoSuchAccount(format!("uid {uid}")))?;
        self.user = Credentials {
            uid: user.uid,
            gid: user.gid,
        };

        Ok(())
    }

    #[inline]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        let path = self.normalize(path);
        if !self.resolve_inode(&path)?.is_dir() {
            return Err(Error::NotADirectory(path));
        }
        self.cwd = path;

        Ok(())
    }
}

// 路径解析
impl DirectoryTree {
    /// 纯字符串层面的规范化，不访问磁盘
    #[inline]
    pub fn normalize(&self, path: &str) -> String {
        path.canonicalize(&self.cwd)
    }

    /// 逐项查找目录项得到 inode 编号；`..` 沿目录中的 `..` 项回溯
    pub fn resolve(&self, path: &str) -> Result<u32> {
        let root = self.fs.superblock().root_inode;
        if path == "/" {
            return Ok(root);
        }

        let mut current = if path.is_absolute() {
            root
        } else {
            self.resolve(&self.cwd)?
        };
        for cmp in path.components() {
            let dir = self.fs.read_inode(current)?;
            if !dir.is_dir() {
                return Err(Error::NotADirectory(self.normalize(path)));
            }
            current = self
                .fs
                .lookup(&dir, cmp)?
                .and_then(|entry| entry.inode_id())
                .ok_or_else(|| Error::NotFound(self.normalize(path)))?;
        }

        Ok(current)
    }

    pub fn resolve_inode(&self, path: &str) -> Result<DiskInode> {
        self.fs.read_inode(self.resolve(path)?)
    }

    /// 拆出父目录与最后一项名字；父目录必须存在
    fn split_target<'p>(&self, path: &'p str) -> Result<(DiskInode, &'p str)> {
        let (parent, name) = path
            .parent_file()
            .ok_or_else(|| Error::InvalidName(path.to_string()))?;
        let dir = self.resolve_inode(parent)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(self.normalize(parent)));
        }

        Ok((dir, name))
    }

    /// 除 `.` 与 `..` 之外的有效目录项
    fn children(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        Ok(self
            .fs
            .read_dir(dir)?
            .into_iter()
            .filter(|entry| !entry.is_free() && !entry.is_special())
            .collect())
    }

    /// 名字未被占用且目录还有空闲槽位
    fn check_vacancy(&self, dir: &DiskInode, name: &str, path: &str) -> Result<()> {
        let entries = self.fs.read_dir(dir)?;
        if entries
            .iter()
            .any(|entry| !entry.is_free() && entry.name() == name)
        {
            return Err(Error::AlreadyExists(self.normalize(path)));
        }
        if entries.len() >= self.fs.entries_per_block() && !entries.iter().any(DirEntry::is_free) {
            return Err(Error::DirectoryFull(self.normalize(path)));
        }

        Ok(())
    }
}

// 权限
impl DirectoryTree {
    /// root 全部放行；属主看高三位，组成员看低三位，其他人一律拒绝
    fn allows(&self, inode: &DiskInode, access: Access) -> bool {
        let accounts = self.fs.accounts();
        if accounts.is_privileged(self.user.uid) {
            true
        } else if inode.uid == self.user.uid {
            inode.owner_allows(access)
        } else if inode.gid == self.user.gid || accounts.is_member(self.user.uid, inode.gid) {
            inode.group_allows(access)
        } else {
            false
        }
    }

    fn require(&self, inode: &DiskInode, access: Access, path: &str) -> Result<()> {
        if self.allows(inode, access) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(self.normalize(path)))
        }
    }

    /// 只有属主或 root
    fn require_owner(&self, inode: &DiskInode, path: &str) -> Result<()> {
        if inode.uid == self.user.uid || self.fs.accounts().is_privileged(self.user.uid) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(self.normalize(path)))
        }
    }
}
