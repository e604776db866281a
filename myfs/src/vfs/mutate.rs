//! 修改目录树的操作：mkdir、建文件、读写、rm、mv、ln

use enumflags2::BitFlags;

use super::DirectoryTree;
use super::path::Path;
use crate::efs::now;
use crate::layout::{Access, DirEntry, DiskInode, InodeKind, validate_name};
use crate::{DEFAULT_FILE_PERMS, Error, Result};

/// 待删除的一项
struct Doomed {
    parent: u32,
    name: String,
    inode: DiskInode,
}

impl DirectoryTree {
    /// 逐个新建目录；某一项失败不影响其余各项
    pub fn mkdir<S: AsRef<str>>(&mut self, paths: &[S]) -> Vec<Result<u32>> {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                self.mkdir_one(path).inspect_err(|err| log::warn!("mkdir {path}: {err}"))
            })
            .collect()
    }

    fn mkdir_one(&mut self, path: &str) -> Result<u32> {
        let (mut parent, name) = self.split_target(path)?;
        validate_name(name)?;
        self.require(&parent, Access::Write, path)?;
        self.check_vacancy(&parent, name, path)?;

        let dir = self
            .fs
            .new_directory(Some(parent.id), name, self.user.uid, self.user.gid)?;
        // 子目录的 `..`
        parent.links += 1;
        self.fs
            .add_entry(&mut parent, DirEntry::new(name, dir.id, InodeKind::Directory))?;

        log::debug!("mkdir {} -> inode {}", self.normalize(path), dir.id);
        Ok(dir.id)
    }

    /// 新建普通文件，内容可为空
    pub fn create_file(&mut self, path: &str, content: &[u8]) -> Result<u32> {
        let (mut parent, name) = self.split_target(path)?;
        validate_name(name)?;
        self.require(&parent, Access::Write, path)?;
        self.check_vacancy(&parent, name, path)?;

        let perms = BitFlags::from_bits_truncate(DEFAULT_FILE_PERMS);
        let mut inode = self
            .fs
            .new_inode(InodeKind::File, perms, self.user.uid, self.user.gid)?;
        inode.set_name(name);
        if let Err(err) = self.fs.write_file(&mut inode, content) {
            self.fs.release_inode_blocks(&mut inode)?;
            self.fs.free_inode(inode.id)?;
            return Err(err);
        }
        self.fs
            .add_entry(&mut parent, DirEntry::new(name, inode.id, InodeKind::File))?;

        log::debug!("create {} -> inode {}", self.normalize(path), inode.id);
        Ok(inode.id)
    }

    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut inode = self.resolve_inode(path)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory(self.normalize(path)));
        }
        self.require(&inode, Access::Read, path)?;

        let data = self.fs.read_file(&inode)?;
        inode.accessed_at = now();
        self.fs.write_inode(&inode)?;

        Ok(data)
    }

    /// 整体覆盖文件内容；已打开的文件拒绝写入
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.normalize(path);
        if self.fs.is_open(&key) {
            return Err(Error::FileOpen(key));
        }
        let mut inode = self.resolve_inode(path)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory(key));
        }
        self.require(&inode, Access::Write, path)?;

        self.fs.write_file(&mut inode, data)
    }

    /// 逐个删除；非空目录需要 `recursive`
    pub fn rm<S: AsRef<str>>(&mut self, paths: &[S], recursive: bool) -> Vec<Result<()>> {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                self.rm_one(path, recursive)
                    .inspect_err(|err| log::warn!("rm {path}: {err}"))
            })
            .collect()
    }

    fn rm_one(&mut self, path: &str, recursive: bool) -> Result<()> {
        let (parent, name) = self.split_target(path)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidName(name.to_string()));
        }
        let inode = self.lookup_inode(&parent, name, path)?;
        if inode.is_dir() && !recursive && !self.children(&inode)?.is_empty() {
            return Err(Error::DirectoryNotEmpty(self.normalize(path)));
        }

        // 先检查整棵子树的权限，再动手
        let doomed = self.collect_doomed(Doomed {
            parent: parent.id,
            name: name.to_string(),
            inode,
        })?;
        for node in &doomed {
            self.require_owner(&node.inode, path)?;
        }
        for node in doomed {
            self.unlink(node)?;
        }

        log::debug!("rm {}", self.normalize(path));
        Ok(())
    }

    /// 后序排列的整棵子树，孩子先于其目录
    fn collect_doomed(&self, top: Doomed) -> Result<Vec<Doomed>> {
        let mut doomed = Vec::new();
        let mut stack = vec![(top, false)];

        while let Some((node, expanded)) = stack.pop() {
            if !node.inode.is_dir() || expanded {
                doomed.push(node);
                continue;
            }

            let children = self.children(&node.inode)?;
            let parent = node.inode.id;
            stack.push((node, true));
            for child in children {
                let Some(id) = child.inode_id() else { continue };
                stack.push((
                    Doomed {
                        parent,
                        name: child.name().to_string(),
                        inode: self.fs.read_inode(id)?,
                    },
                    false,
                ));
            }
        }

        Ok(doomed)
    }

    /// 摘除目录项；目录总是回收，文件在链接数归零时回收
    fn unlink(&mut self, node: Doomed) -> Result<()> {
        let mut parent = self.fs.read_inode(node.parent)?;
        let mut inode = self.fs.read_inode(node.inode.id)?;
        self.fs.remove_entry(&mut parent, &node.name)?;

        if inode.is_dir() {
            parent.links = parent.links.saturating_sub(1);
            self.fs.write_inode(&parent)?;
            inode.links = 0;
        } else {
            inode.links = inode.links.saturating_sub(1);
        }

        if inode.links == 0 {
            self.fs.release_inode_blocks(&mut inode)?;
            self.fs.free_inode(inode.id)?;
            self.fs.close_inode(inode.id);
        } else {
            self.fs.write_inode(&inode)?;
        }

        Ok(())
    }

    /// 移动或改名。
    ///
    /// `dest` 是已有目录时移入其中并保留原名；不存在时其最后一项作为新名字。
    pub fn mv(&mut self, src: &str, dest: &str) -> Result<()> {
        let (mut src_parent, src_name) = self.split_target(src)?;
        if src_name == "." || src_name == ".." {
            return Err(Error::InvalidName(src_name.to_string()));
        }
        let mut node = self.lookup_inode(&src_parent, src_name, src)?;
        self.require(&src_parent, Access::Write, src)?;

        let (mut dest_parent, dest_name, moved_to) = match self.resolve_inode(dest) {
            Ok(dir) if dir.is_dir() => {
                let to = format!("{}/{src_name}", self.normalize(dest).trim_end_matches('/'));
                (dir, src_name, to)
            }
            Ok(_) => return Err(Error::AlreadyExists(self.normalize(dest))),
            Err(Error::NotFound(_)) => {
                let (parent, name) = self.split_target(dest)?;
                validate_name(name)?;
                (parent, name, self.normalize(dest))
            }
            Err(err) => return Err(err),
        };
        self.require(&dest_parent, Access::Write, dest)?;
        if node.is_dir() {
            self.ensure_outside(node.id, dest_parent.id, src)?;
        }

        if dest_parent.id == src_parent.id {
            if self.fs.lookup(&dest_parent, dest_name)?.is_some() {
                return Err(Error::AlreadyExists(self.normalize(dest)));
            }
            let mut entries = self.fs.read_dir(&dest_parent)?;
            if let Some(entry) = entries
                .iter_mut()
                .find(|entry| !entry.is_free() && entry.name() == src_name)
            {
                entry.set_name(dest_name);
            }
            self.fs.write_dir(&mut dest_parent, &entries)?;
        } else {
            self.check_vacancy(&dest_parent, dest_name, dest)?;

            self.fs.remove_entry(&mut src_parent, src_name)?;
            if node.is_dir() {
                src_parent.links = src_parent.links.saturating_sub(1);
                self.fs.write_inode(&src_parent)?;
                dest_parent.links += 1;
            }
            self.fs
                .add_entry(&mut dest_parent, DirEntry::new(dest_name, node.id, node.kind))?;

            if node.is_dir() {
                let mut entries = self.fs.read_dir(&node)?;
                if let Some(dotdot) = entries
                    .iter_mut()
                    .find(|entry| !entry.is_free() && entry.name() == "..")
                {
                    dotdot.set_inode_id(dest_parent.id);
                }
                self.fs.write_dir(&mut node, &entries)?;
            }
        }

        node.set_name(dest_name);
        self.fs.write_inode(&node)?;

        let moved_from = self.normalize(src);
        self.fs.rename_open(&moved_from, &moved_to);

        log::debug!("mv {moved_from} -> {moved_to}");
        Ok(())
    }

    /// 目标目录不能是被移动目录本身或其后代
    fn ensure_outside(&self, moved: u32, target: u32, path: &str) -> Result<()> {
        let root = self.fs.superblock().root_inode;
        let mut current = target;

        for _ in 0..self.fs.superblock().total_inodes {
            if current == moved {
                return Err(Error::InvalidMove(self.normalize(path)));
            }
            if current == root {
                return Ok(());
            }
            let dir = self.fs.read_inode(current)?;
            let parent = self
                .fs
                .lookup(&dir, "..")?
                .and_then(|entry| entry.inode_id())
                .ok_or_else(|| Error::Corrupt(format!("directory {current} has no `..`")))?;
            if parent == current {
                return Ok(());
            }
            current = parent;
        }

        Err(Error::Corrupt("`..` chain does not reach the root".to_string()))
    }

    /// 硬链接：新目录项指向同一 inode，链接数加一
    pub fn ln(&mut self, src: &str, dest: &str) -> Result<()> {
        let mut node = self.resolve_inode(src)?;
        if node.is_dir() {
            return Err(Error::IsADirectory(self.normalize(src)));
        }
        self.require(&node, Access::Read, src)?;

        let (mut dir, name) = self.split_target(dest)?;
        validate_name(name)?;
        self.require(&dir, Access::Write, dest)?;
        self.check_vacancy(&dir, name, dest)?;

        self.fs
            .add_entry(&mut dir, DirEntry::new(name, node.id, node.kind))?;
        node.links += 1;
        self.fs.write_inode(&node)?;

        log::debug!(
            "ln {} -> {} (links {})",
            self.normalize(dest),
            node.id,
            node.links
        );
        Ok(())
    }

    fn lookup_inode(&self, dir: &DiskInode, name: &str, path: &str) -> Result<DiskInode> {
        let id = self
            .fs
            .lookup(dir, name)?
            .and_then(|entry| entry.inode_id())
            .ok_or_else(|| Error::NotFound(path.canonicalize(&self.cwd)))?;

        self.fs.read_inode(id)
    }
}
