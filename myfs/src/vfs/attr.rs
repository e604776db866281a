//! 只读查询与属性修改：ls、stat、whereis、open/close、chmod、chown、chgrp

use enumflags2::BitFlags;

use super::DirectoryTree;
use crate::layout::{Access, DiskInode, InodeKind, Perm};
use crate::{Error, Result};

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub inode: u32,
    pub kind: InodeKind,
    pub perms: BitFlags<Perm>,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links: u32,
    pub modified_at: i64,
}

/// inode 的完整信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: String,
    pub inode: u32,
    pub kind: InodeKind,
    pub perms: BitFlags<Perm>,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links: u32,
    pub open: bool,
    pub created_at: i64,
    pub modified_at: i64,
    pub accessed_at: i64,
    /// 已设置的直接索引
    pub direct: Vec<u32>,
    pub indirect: Option<u32>,
    /// 间接索引块中登记的数据块
    pub indirect_pointers: Vec<u32>,
}

impl DirectoryTree {
    /// 目录中所有在用的目录项，含 `.` 与 `..`
    pub fn list(&self, path: &str) -> Result<Vec<Listing>> {
        let dir = self.resolve_inode(path)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(self.normalize(path)));
        }
        self.require(&dir, Access::Read, path)?;

        self.fs
            .read_dir(&dir)?
            .into_iter()
            .filter_map(|entry| entry.inode_id().map(|id| (entry, id)))
            .map(|(entry, id)| {
                let inode = self.fs.read_inode(id)?;
                Ok(Listing {
                    name: entry.name().to_string(),
                    inode: id,
                    kind: inode.kind,
                    perms: inode.perms,
                    uid: inode.uid,
                    gid: inode.gid,
                    size: inode.size,
                    links: inode.links,
                    modified_at: inode.modified_at,
                })
            })
            .collect()
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let inode = self.resolve_inode(path)?;

        Ok(FileStat {
            path: self.normalize(path),
            inode: inode.id,
            kind: inode.kind,
            perms: inode.perms,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            links: inode.links,
            open: inode.open,
            created_at: inode.created_at,
            modified_at: inode.modified_at,
            accessed_at: inode.accessed_at,
            direct: inode.direct.iter().flatten().copied().collect(),
            indirect: inode.indirect,
            indirect_pointers: self.fs.indirect_pointers(&inode)?,
        })
    }

    /// 从根目录深度优先查找所有名为 `name` 的项，按遍历顺序返回其绝对路径
    pub fn whereis(&self, name: &str) -> Result<Vec<String>> {
        let root = self.fs.read_inode(self.fs.superblock().root_inode)?;
        let mut found = Vec::new();
        let mut stack: Vec<_> = self
            .children(&root)?
            .into_iter()
            .rev()
            .map(|entry| (format!("/{}", entry.name()), entry))
            .collect();

        while let Some((path, entry)) = stack.pop() {
            if entry.name() == name {
                found.push(path.clone());
            }
            let Some(id) = entry.inode_id() else { continue };
            if entry.kind() != InodeKind::Directory {
                continue;
            }

            let dir = self.fs.read_inode(id)?;
            for child in self.children(&dir)?.into_iter().rev() {
                stack.push((format!("{path}/{}", child.name()), child));
            }
        }

        Ok(found)
    }

    /// 登记到打开文件表；已打开时返回 `false`
    pub fn open(&mut self, path: &str) -> Result<bool> {
        let key = self.normalize(path);
        if self.fs.is_open(&key) {
            return Ok(false);
        }

        let mut inode = self.resolve_inode(&key)?;
        if !inode.is_file() {
            return Err(Error::NotAFile(key));
        }
        self.require(&inode, Access::Read, &key)?;
        inode.open = true;
        self.fs.write_inode(&inode)?;
        self.fs.open_file(&key, inode);

        Ok(true)
    }

    /// 从打开文件表移除；未打开时返回 `false`
    pub fn close(&mut self, path: &str) -> Result<bool> {
        let key = self.normalize(path);
        let Some(inode) = self.fs.close_file(&key) else {
            return Ok(false);
        };

        let mut inode = self.fs.read_inode(inode.id)?;
        inode.open = false;
        self.fs.write_inode(&inode)?;

        Ok(true)
    }

    /// `mode` 为两位八进制数字，如 `"75"`
    pub fn chmod(&mut self, mode: &str, path: &str) -> Result<()> {
        let perms = Perm::parse(mode)?;
        let mut inode = self.resolve_inode(path)?;
        self.require_owner(&inode, path)?;

        inode.perms = perms;
        self.fs.write_inode(&inode)
    }

    pub fn chown(&mut self, user: &str, path: &str, recursive: bool) -> Result<()> {
        let uid = self
            .fs
            .accounts()
            .user_by_name(user)
            .ok_or_else(|| Error::NoSuchAccount(user.to_string()))?
            .uid;

        self.update_subtree(path, recursive, |inode| inode.uid = uid)
    }

    pub fn chgrp(&mut self, group: &str, path: &str, recursive: bool) -> Result<()> {
        let gid = self
            .fs
            .accounts()
            .group_by_name(group)
            .ok_or_else(|| Error::NoSuchAccount(group.to_string()))?
            .gid;

        self.update_subtree(path, recursive, |inode| inode.gid = gid)
    }

    /// 先确认对每一项都有属主权限，再逐项修改
    fn update_subtree(
        &mut self,
        path: &str,
        recursive: bool,
        update: impl Fn(&mut DiskInode),
    ) -> Result<()> {
        let top = self.resolve_inode(path)?;
        let mut nodes = Vec::new();
        let mut stack = vec![top];

        while let Some(inode) = stack.pop() {
            if recursive && inode.is_dir() {
                for child in self.children(&inode)? {
                    if let Some(id) = child.inode_id() {
                        stack.push(self.fs.read_inode(id)?);
                    }
                }
            }
            nodes.push(inode);
        }
        for inode in &nodes {
            self.require_owner(inode, path)?;
        }

        for inode in nodes {
            // 硬链接可能使同一 inode 出现多次
            let mut inode = self.fs.read_inode(inode.id)?;
            update(&mut inode);
            self.fs.write_inode(&inode)?;
        }

        Ok(())
    }
}
