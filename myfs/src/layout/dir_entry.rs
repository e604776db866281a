use super::OnDisk;
use super::InodeKind;
use super::codec::{Decoder, Encoder};
use crate::{DIR_ENTRY_SIZE, Error, NAME_MAX_LEN, Result};

/// 文件系统项的元信息
///
/// 磁盘格式：`inode i32 | kind i32 | name_len i32 | name [u8; 244]`。
/// `inode == -1` 或类型为 [`InodeKind::Free`] 的槽位视为空闲。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    inode_id: Option<u32>,
    kind: InodeKind,
    name: String,
}

impl DirEntry {
    /// 空闲槽位
    pub const EMPTY: Self = Self {
        inode_id: None,
        kind: InodeKind::Free,
        name: String::new(),
    };

    #[inline]
    pub fn new(name: &str, inode_id: u32, kind: InodeKind) -> Self {
        Self {
            inode_id: Some(inode_id),
            kind,
            name: name.to_string(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.kind
    }

    /// 空闲槽位没有 inode
    #[inline]
    pub fn inode_id(&self) -> Option<u32> {
        if self.is_free() { None } else { self.inode_id }
    }

    #[inline]
    pub fn set_inode_id(&mut self, inode_id: u32) {
        self.inode_id = Some(inode_id);
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.inode_id.is_none() || self.kind == InodeKind::Free
    }

    /// `.` 与 `..`
    #[inline]
    pub fn is_special(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

impl OnDisk for DirEntry {
    const SIZE: usize = DIR_ENTRY_SIZE;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Self::SIZE);
        enc.put_ptr(self.inode_id);
        enc.put_i32(self.kind as i32);
        enc.put_u32(self.name.len() as u32);
        enc.put_name(&self.name, NAME_MAX_LEN)?;

        Ok(enc.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, Self::SIZE, "directory entry")?;

        let inode_id = dec.ptr();
        let kind = dec.i32().try_into()?;
        let name_len = dec.i32();
        let name_len = usize::try_from(name_len)
            .map_err(|_| Error::Corrupt(format!("negative name length {name_len}")))?;
        let name = dec.name_with_len(name_len, NAME_MAX_LEN)?;

        Ok(Self {
            inode_id,
            kind,
            name,
        })
    }
}

/// 合法的文件名：非空、不超过 [`NAME_MAX_LEN`] 字节、不含 `/` 与 NUL，且不是 `.` 或 `..`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > NAME_MAX_LEN
        || name.contains(['/', '\0'])
        || name == "."
        || name == ".."
    {
        return Err(Error::InvalidName(name.to_string()));
    }

    Ok(())
}
