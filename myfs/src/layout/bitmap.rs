/// 位图，记录其指示区域的分配情况。
///
/// 驻留内存，按 64 位分组；落盘时第 `i` 位位于第 `i / 8` 字节的第 `i % 8` 位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    groups: Vec<u64>,
    /// 可编号数量，超出部分的位恒为 0
    capacity: usize,
}

impl Bitmap {
    /// 全部空闲的位图
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// 由磁盘字节恢复，容量以外的位被忽略
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Self {
        let mut bitmap = Self::new(capacity);
        for (index, &byte) in bytes.iter().take(capacity.div_ceil(8)).enumerate() {
            bitmap.groups[index / 8] |= (byte as u64) << (index % 8 * 8);
        }
        bitmap.clear_tail();

        bitmap
    }

    /// 落盘字节，长度为 `ceil(capacity / 8)`
    pub fn to_bytes(&self) -> Vec<u8> {
        self.groups
            .iter()
            .flat_map(|group| group.to_le_bytes())
            .take(self.capacity.div_ceil(8))
            .collect()
    }

    /// 存放该位图所需的块数
    #[inline]
    pub fn blocks(capacity: usize, block_size: usize) -> usize {
        capacity.div_ceil(8).div_ceil(block_size)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 首个空闲位
    pub fn first_free(&self) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != u64::MAX)
                    .then_some(group_index * 64 + bits.trailing_ones() as usize)
            })
            .filter(|&index| index < self.capacity)
    }

    /// 分配首个空闲位，返回其编号；若位图的空间用尽，则返回空
    pub fn alloc(&mut self) -> Option<usize> {
        let index = self.first_free()?;
        self.set(index);
        Some(index)
    }

    /// 置位，返回此前是否空闲；越界的位不予理会
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let was_free = !self.is_set(index);
        self.groups[index / 64] |= 1 << (index % 64);
        was_free
    }

    /// 清位，返回此前是否已分配
    pub fn clear(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let was_set = self.is_set(index);
        self.groups[index / 64] &= !(1 << (index % 64));
        was_set
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        index < self.capacity && self.groups[index / 64] & (1 << (index % 64)) != 0
    }

    pub fn count_free(&self) -> usize {
        let used: u32 = self.groups.iter().map(|bits| bits.count_ones()).sum();
        self.capacity - used as usize
    }

    fn clear_tail(&mut self) {
        let tail = self.capacity % 64;
        if tail == 0 {
            return;
        }
        if let Some(last) = self.groups.last_mut() {
            *last &= (1 << tail) - 1;
        }
    }
}
