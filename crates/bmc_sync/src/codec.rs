// crates/bmc_sync/src/codec.rs

//! 长度前缀的载荷编解码
//!
//! 帧内按段组织：每段一个 u64 元素计数前缀，随后是 POD 数组
//! 的原始字节（主机字节序，帧只在同一台机器的进程/线程间
//! 传递）。读取端逐元素非对齐读取，对缓冲区偏移无对齐要求。

use bmc_foundation::error::{BmcError, BmcResult};
use bytemuck::Pod;

/// 追加式帧编码器
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    /// 空帧
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个标量
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(&value));
        self
    }

    /// 写入一个浮点标量
    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(&value));
        self
    }

    /// 写入一段 POD 数组（计数前缀 + 原始字节）
    pub fn put_slice<T: Pod>(&mut self, values: &[T]) -> &mut Self {
        self.put_u64(values.len() as u64);
        self.buf.extend_from_slice(bytemuck::cast_slice(values));
        self
    }

    /// 结束编码，取出字节
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// 顺序帧解码器
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// 从字节缓冲区开始解码
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_bytes(&mut self, n: usize) -> BmcResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            BmcError::communication("帧偏移溢出")
        })?;
        if end > self.buf.len() {
            return Err(BmcError::communication(format!(
                "帧截断: 需要 {n} 字节，剩余 {}",
                self.buf.len() - self.pos
            )));
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// 读取一个标量
    pub fn take_u64(&mut self) -> BmcResult<u64> {
        let bytes = self.take_bytes(std::mem::size_of::<u64>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// 读取一个浮点标量
    pub fn take_f64(&mut self) -> BmcResult<f64> {
        let bytes = self.take_bytes(std::mem::size_of::<f64>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// 读取一段 POD 数组
    pub fn take_vec<T: Pod>(&mut self) -> BmcResult<Vec<T>> {
        let len = self.take_u64()? as usize;
        let size = std::mem::size_of::<T>();
        let n_bytes = len.checked_mul(size).ok_or_else(|| {
            BmcError::communication(format!("帧段长度溢出: {len} 个元素"))
        })?;
        let bytes = self.take_bytes(n_bytes)?;
        Ok(bytes
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// 帧是否读尽
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_mixed_sections() {
        let mut w = FrameWriter::new();
        w.put_u64(7)
            .put_f64(0.125)
            .put_slice(&[1.5f64, -2.25, 0.0])
            .put_slice(&[10u64, 20]);
        let bytes = w.finish();

        let mut r = FrameReader::new(&bytes);
        assert_eq!(r.take_u64().unwrap(), 7);
        assert_eq!(r.take_f64().unwrap(), 0.125);
        assert_eq!(r.take_vec::<f64>().unwrap(), vec![1.5, -2.25, 0.0]);
        assert_eq!(r.take_vec::<u64>().unwrap(), vec![10, 20]);
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_empty_section() {
        let mut w = FrameWriter::new();
        w.put_slice::<f64>(&[]);
        let bytes = w.finish();
        let mut r = FrameReader::new(&bytes);
        assert!(r.take_vec::<f64>().unwrap().is_empty());
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut w = FrameWriter::new();
        w.put_slice(&[1.0f64, 2.0]);
        let bytes = w.finish();
        let mut r = FrameReader::new(&bytes[..bytes.len() - 1]);
        assert!(r.take_vec::<f64>().is_err());
    }

    #[test]
    fn test_bogus_length_prefix_is_error() {
        // 前缀声称 u64::MAX 个元素
        let mut w = FrameWriter::new();
        w.put_u64(u64::MAX);
        let bytes = w.finish();
        let mut r = FrameReader::new(&bytes);
        assert!(r.take_vec::<f64>().is_err());
    }
}
