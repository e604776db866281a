//! # 磁盘数据结构层
//!
//! myfs 的磁盘布局：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域
//!
//! 所有整数均以大端序存放；指针以 `-1` 表示未使用。

mod codec;

mod super_block;
pub use super_block::{AllocStrategy, SuperBlock};

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{Access, DiskInode, InodeKind, Perm};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, validate_name};

/// 用户表与组表
mod account;
pub use account::{AccountTable, Group, User};

use crate::Result;

/// 定长的磁盘记录
pub trait OnDisk: Sized {
    /// 编码后的字节数
    const SIZE: usize;

    fn encode(&self) -> Result<Vec<u8>>;

    /// `bytes.len()` 必须恰为 [`OnDisk::SIZE`]
    fn decode(bytes: &[u8]) -> Result<Self>;
}
