//! 存储引擎与目录树共用的错误类型

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 后端文件的读、写或定位失败
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 后端文件不是 myfs 卷，或其布局自相矛盾
    #[error("invalid volume: {0}")]
    InvalidVolume(String),

    #[error("{} is already mounted", .0.display())]
    AlreadyMounted(PathBuf),

    /// 格式化参数无法排布出一个卷
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// 记录解码失败
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("no free inode left")]
    NoFreeInode,

    #[error("no free data block left")]
    NoFreeBlock,

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// 目录唯一的目录项块已无空槽
    #[error("directory full: {0}")]
    DirectoryFull(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("cannot move {0} into itself")]
    InvalidMove(String),

    #[error("file is open: {0}")]
    FileOpen(String),

    #[error("invalid permissions: {0:?}")]
    InvalidPermissions(String),

    #[error("no such user or group: {0}")]
    NoSuchAccount(String),

    #[error("account table does not fit in one block")]
    AccountTableFull,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must not be empty")]
    EmptyPassword,
}

pub type Result<T> = core::result::Result<T, Error>;
