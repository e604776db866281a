use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::BlockDevice;

/// 以宿主机单个文件为后端的磁盘镜像
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<File>,
    path: PathBuf,
    block_size: usize,
}

impl BlockFile {
    /// 创建（或截断）`path`，并将其长度设为 `total_bytes`
    pub fn create(path: impl AsRef<Path>, total_bytes: u64, block_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            log::warn!("{} already exists and will be overwritten", path.display());
        }

        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len(total_bytes)?;

        Ok(Self::new(fd, path, block_size))
    }

    /// 以读写方式打开已有的镜像
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self::new(fd, path, block_size))
    }

    /// 在块大小未知时读取 `path` 的前 `len` 个字节
    pub fn read_header(path: impl AsRef<Path>, len: usize) -> io::Result<Vec<u8>> {
        let mut header = vec![0; len];
        File::open(path)?.read_exact(&mut header)?;

        Ok(header)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 后端文件的字节数
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }
}

impl BlockFile {
    fn new(fd: File, path: &Path, block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");

        Self {
            inner: Mutex::new(fd),
            path: path.to_path_buf(),
            block_size,
        }
    }

    fn file(&self) -> io::Result<MutexGuard<'_, File>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("block file lock poisoned"))
    }

    #[inline]
    fn offset(&self, block_id: usize) -> u64 {
        (block_id * self.block_size) as u64
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        log::trace!("read block {block_id}");

        let mut file = self.file()?;
        file.seek(SeekFrom::Start(self.offset(block_id)))?;
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        log::trace!("write block {block_id}");

        let mut file = self.file()?;
        file.seek(SeekFrom::Start(self.offset(block_id)))?;
        file.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = self.file()?;
        file.flush()?;
        file.sync_all()
    }
}
