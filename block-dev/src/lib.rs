//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 这里只提供一种驱动 [`BlockFile`]：以宿主机上的单个文件充当磁盘，
//! 第 `n` 块位于字节偏移 `n * block_size` 处。

mod block_file;

use core::any::Any;
use std::io;

pub use self::block_file::BlockFile;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 块的字节数
    fn block_size(&self) -> usize;

    /// 将第 `block_id` 块读入 `buf`
    ///
    /// `buf.len()` 须等于 [`BlockDevice::block_size`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;

    /// 将 `buf` 写入第 `block_id` 块
    ///
    /// `buf.len()` 须等于 [`BlockDevice::block_size`]
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;

    /// 将缓冲的写入落到存储上
    fn flush(&self) -> io::Result<()>;
}
