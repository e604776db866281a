/* myfs 的整体架构，自上而下 */

// 目录树层：路径解析，以及创建、删除、移动、链接等操作
mod vfs;

// 磁盘块管理器层：格式化与挂载、分配、块映射、文件与目录读写
mod efs;

// 磁盘数据结构层：各类记录及其编解码
pub mod layout;

mod error;

pub use block_dev::{BlockDevice, BlockFile};

pub use self::{
    efs::{FileSystem, FormatOptions, FsInfo, Usage},
    error::{Error, Result},
    layout::{Access, AccountTable, AllocStrategy, DirEntry, DiskInode, Group, InodeKind, Perm, SuperBlock, User},
    vfs::{Credentials, DirectoryTree, FileStat, Listing},
};

/// 卷标识 "SFYM"
pub const MAGIC: i32 = 0x5346594D;
pub const FS_NAME: &str = "myFS";
pub const FS_VERSION: i32 = 1;

/// inode 表中一条记录的大小
pub const INODE_SIZE: usize = 256;
/// 目录数据块中一个目录项的大小
pub const DIR_ENTRY_SIZE: usize = 256;
/// 目录项可容纳的最长名字
pub const NAME_MAX_LEN: usize = DIR_ENTRY_SIZE - 12;
/// inode 内缓存的名字宽度，仅供展示
pub const INODE_NAME_LEN: usize = 64;
/// 直接索引个数
pub const DIRECT_COUNT: usize = 12;

/// 每 16 KiB 卷空间配一个 inode
pub const BYTES_PER_INODE: u64 = 16 * 1024;
pub const DEFAULT_BLOCK_SIZE_KB: u32 = 4;

pub const ROOT_INODE: u32 = 0;
pub const ROOT_UID: u32 = 0;
pub const ROOT_GID: u32 = 0;
pub const USERS_GID: u32 = 1;

/// rwxrwx
pub const DEFAULT_DIR_PERMS: u32 = 0o77;
/// rw-rw-
pub const DEFAULT_FILE_PERMS: u32 = 0o66;

/// 账户表所在的数据块，相对数据区起始
pub const USER_TABLE_BLOCK: u32 = 4;
pub const GROUP_TABLE_BLOCK: u32 = 5;
