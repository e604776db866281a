use super::OnDisk;
use super::codec::{Decoder, Encoder};
use crate::{Error, MAGIC, Result};

/// 文件内容的分配策略，只有索引分配真正实现
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AllocStrategy {
    Contiguous = 1,
    Linked = 2,
    #[default]
    Indexed = 3,
}

impl TryFrom<i32> for AllocStrategy {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Contiguous),
            2 => Ok(Self::Linked),
            3 => Ok(Self::Indexed),
            _ => Err(Error::Corrupt(format!("unknown allocation strategy {value}"))),
        }
    }
}

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录几何参数与空闲计数；
/// - 定位其它连续区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 卷名，最长 32 字节
    pub name: String,
    pub version: i32,
    pub block_size: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub total_inodes: u32,
    /// 始终等于数据块位图中空闲位的个数
    pub free_blocks: u32,
    /// 始终等于索引节点位图中空闲位的个数
    pub free_inodes: u32,
    pub root_inode: u32,
    pub allocation: AllocStrategy,
    pub inode_bitmap_start: u32,
    pub data_bitmap_start: u32,
    pub inode_table_start: u32,
    pub data_blocks_start: u32,
    /// 毫秒时间戳
    pub created_at: i64,
    pub mounted_at: i64,
}

impl SuperBlock {
    const NAME_LEN: usize = 32;

    /// 数据区的块数
    #[inline]
    pub fn data_blocks(&self) -> u32 {
        self.total_blocks - self.data_blocks_start
    }

    #[inline]
    pub fn inode_bitmap_blocks(&self) -> u32 {
        self.data_bitmap_start - self.inode_bitmap_start
    }

    #[inline]
    pub fn data_bitmap_blocks(&self) -> u32 {
        self.inode_table_start - self.data_bitmap_start
    }

    #[inline]
    pub fn inode_table_blocks(&self) -> u32 {
        self.data_blocks_start - self.inode_table_start
    }

    /// 区域必须按序排列且落在卷内
    pub fn is_consistent(&self) -> bool {
        self.inode_bitmap_start == 1
            && self.inode_bitmap_start < self.data_bitmap_start
            && self.data_bitmap_start < self.inode_table_start
            && self.inode_table_start < self.data_blocks_start
            && self.data_blocks_start < self.total_blocks
            && self.free_blocks <= self.data_blocks()
            && self.free_inodes <= self.total_inodes
            && self.root_inode < self.total_inodes
    }
}

impl OnDisk for SuperBlock {
    const SIZE: usize = 100;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Self::SIZE);
        enc.put_i32(MAGIC);
        enc.put_name(&self.name, Self::NAME_LEN)?;
        enc.put_i32(self.version);
        enc.put_u32(self.block_size);
        enc.put_u32(self.total_blocks);
        enc.put_u32(self.total_inodes);
        enc.put_u32(self.free_blocks);
        enc.put_u32(self.free_inodes);
        enc.put_u32(self.root_inode);
        enc.put_i32(self.allocation as i32);
        enc.put_u32(self.inode_bitmap_start);
        enc.put_u32(self.data_bitmap_start);
        enc.put_u32(self.inode_table_start);
        enc.put_u32(self.data_blocks_start);
        enc.put_i64(self.created_at);
        enc.put_i64(self.mounted_at);

        Ok(enc.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, Self::SIZE, "superblock")?;

        let magic = dec.i32();
        if magic != MAGIC {
            return Err(Error::InvalidVolume(format!("bad magic {magic:#010x}")));
        }

        Ok(Self {
            name: dec.name(Self::NAME_LEN)?,
            version: dec.i32(),
            block_size: dec.u32("block size")?,
            total_blocks: dec.u32("total blocks")?,
            total_inodes: dec.u32("total inodes")?,
            free_blocks: dec.u32("free blocks")?,
            free_inodes: dec.u32("free inodes")?,
            root_inode: dec.u32("root inode")?,
            allocation: dec.i32().try_into()?,
            inode_bitmap_start: dec.u32("inode bitmap start")?,
            data_bitmap_start: dec.u32("data bitmap start")?,
            inode_table_start: dec.u32("inode table start")?,
            data_blocks_start: dec.u32("data blocks start")?,
            created_at: dec.i64(),
            mounted_at: dec.i64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SuperBlock {
        SuperBlock {
            name: "myFS".to_string(),
            version: 1,
            block_size: 4096,
            total_blocks: 4096,
            total_inodes: 1024,
            free_blocks: 4023,
            free_inodes: 1020,
            root_inode: 0,
            allocation: AllocStrategy::Indexed,
            inode_bitmap_start: 1,
            data_bitmap_start: 2,
            inode_table_start: 3,
            data_blocks_start: 67,
            created_at: 1_700_000_000_123,
            mounted_at: -1,
        }
    }

    #[test]
    fn round_trip() {
        let sb = sample();
        let bytes = sb.encode().unwrap();
        assert_eq!(bytes.len(), SuperBlock::SIZE);
        assert_eq!(SuperBlock::decode(&bytes).unwrap(), sb);
    }

    #[test]
    fn layout_is_big_endian() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[..4], &[0x53, 0x46, 0x59, 0x4D]);
        assert_eq!(&bytes[4..8], b"myFS");
        // block_size 紧跟 name 与 version
        assert_eq!(&bytes[40..44], &4096i32.to_be_bytes());
    }

    #[test]
    fn foreign_bytes_are_not_a_volume() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = 0;
        assert!(matches!(
            SuperBlock::decode(&bytes),
            Err(Error::InvalidVolume(_))
        ));
    }

    #[test]
    fn wrong_length_is_corrupt() {
        let bytes = sample().encode().unwrap();
        assert!(matches!(
            SuperBlock::decode(&bytes[..99]),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn long_name_is_rejected() {
        let mut sb = sample();
        sb.name = "x".repeat(33);
        assert!(matches!(sb.encode(), Err(Error::InvalidName(_))));
    }

    #[test]
    fn region_sizes() {
        let sb = sample();
        assert!(sb.is_consistent());
        assert_eq!(sb.inode_bitmap_blocks(), 1);
        assert_eq!(sb.inode_table_blocks(), 64);
        assert_eq!(sb.data_bitmap_blocks(), 1);
        assert_eq!(sb.data_blocks(), 4029);
    }

    #[test]
    fn data_bitmap_precedes_inode_table() {
        let mut sb = sample();
        (sb.data_bitmap_start, sb.inode_table_start) = (66, 2);
        assert!(!sb.is_consistent());
    }
}
