#![allow(dead_code)]

use std::path::PathBuf;

use myfs::{DirectoryTree, FileSystem, FormatOptions};
use tempfile::TempDir;

pub const PASSWORD: &str = "hunter2";

/// 1 MiB, 1 KiB 块：每个目录 4 个槽位
pub fn small_volume() -> (TempDir, PathBuf, DirectoryTree) {
    volume(1, 1)
}

pub fn volume(size_mb: u32, block_size_kb: u32) -> (TempDir, PathBuf, DirectoryTree) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let fs = FileSystem::format(&path, &FormatOptions::new(size_mb, block_size_kb, PASSWORD))
        .unwrap();

    (dir, path, DirectoryTree::new(fs))
}

/// 空闲计数与位图一致
pub fn assert_counters(fs: &FileSystem) {
    let sb = fs.superblock();
    assert_eq!(sb.free_inodes as usize, fs.inode_bitmap().count_free());
    assert_eq!(sb.free_blocks as usize, fs.data_bitmap().count_free());
}

/// 可预测但不重复的内容
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
