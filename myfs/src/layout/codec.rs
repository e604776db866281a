//! 大端序定长记录的读写游标

use crate::{Error, Result};

pub(super) struct Encoder {
    buf: Vec<u8>,
    len: usize,
}

impl Encoder {
    #[inline]
    pub fn new(len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(len),
            len,
        }
    }

    #[inline]
    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        // 磁盘上一律为有符号 32 位
        self.put_i32(value as i32);
    }

    #[inline]
    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// `None` 写为 -1
    #[inline]
    pub fn put_ptr(&mut self, ptr: Option<u32>) {
        self.put_i32(ptr.map_or(-1, |id| id as i32));
    }

    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 写入定宽、以 0 补齐的名字
    pub fn put_name(&mut self, name: &str, width: usize) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > width || bytes.contains(&0) {
            return Err(Error::InvalidName(name.to_string()));
        }

        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + width - bytes.len(), 0);
        Ok(())
    }

    /// 补齐到记录长度
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert!(self.buf.len() <= self.len, "record overflow");
        self.buf.resize(self.len, 0);
        self.buf
    }
}

pub(super) struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// 长度不符即视为损坏
    pub fn new(bytes: &'a [u8], len: usize, what: &str) -> Result<Self> {
        if bytes.len() != len {
            return Err(Error::Corrupt(format!(
                "{what}: expected {len} bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Self { bytes, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    #[inline]
    pub fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }

    /// 负数视为损坏
    pub fn u32(&mut self, field: &str) -> Result<u32> {
        let value = self.i32();
        u32::try_from(value).map_err(|_| Error::Corrupt(format!("negative {field}: {value}")))
    }

    #[inline]
    pub fn i64(&mut self) -> i64 {
        i64::from_be_bytes(self.take())
    }

    /// 负数即未使用
    #[inline]
    pub fn ptr(&mut self) -> Option<u32> {
        u32::try_from(self.i32()).ok()
    }

    pub fn bytes<const N: usize>(&mut self) -> [u8; N] {
        self.take()
    }

    /// 读出定宽名字，截去末尾的 0
    pub fn name(&mut self, width: usize) -> Result<String> {
        let raw = &self.bytes[self.pos..self.pos + width];
        self.pos += width;

        let len = raw.iter().position(|&c| c == 0).unwrap_or(width);
        String::from_utf8(raw[..len].to_vec())
            .map_err(|_| Error::Corrupt("name is not valid UTF-8".to_string()))
    }

    /// 读出长度前缀已知的名字
    pub fn name_with_len(&mut self, len: usize, width: usize) -> Result<String> {
        if len > width {
            return Err(Error::Corrupt(format!("name length {len} exceeds {width}")));
        }

        let raw = &self.bytes[self.pos..self.pos + width];
        self.pos += width;
        String::from_utf8(raw[..len].to_vec())
            .map_err(|_| Error::Corrupt("name is not valid UTF-8".to_string()))
    }
}
