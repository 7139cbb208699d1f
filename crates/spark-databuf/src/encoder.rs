//! 线程作用域的零分配 UTF-8 转码器。
//!
//! # 设计背景（Why）
//! - 文本字段是序列化热路径上最频繁的分配来源；编码时若先物化完整字节数组再写出，
//!   每个字段都会产生一次临时分配；
//! - 通过线程本地的定长字节草稿区与“只增不减”的字符缓冲，稳态下编码零分配、解码仅分配最终结果。
//!
//! # 逻辑解析（How）
//! - `encode_to`：清空草稿区 → 尽可能多地写入字符 → 刷出到 [`ByteSink`]；
//!   输入未耗尽（溢出）则继续循环，耗尽（下溢）即停止；
//! - `decode_from`：按声明长度分批从 [`ByteSource`] 读入草稿区，跨批次的不完整多字节序列
//!   搬到草稿区头部与下一批拼接，全部消费后返回累积文本。
//!
//! # 契约说明（What）
//! - [`EncoderPolicy::Lenient`] 遇到非法输入时替换（编码为 `?`，解码为 U+FFFD）；
//!   [`EncoderPolicy::Strict`] 则返回 [`DataError::EncodingFailure`]；
//! - 两种策略共享同一实现，只在错误分支上分叉，避免两套转码器逐渐漂移。
//!
//! # 设计考量（Trade-offs）
//! - 线程本地字符缓冲只增不减：一次大文本解码后，该线程会一直保留对应容量。
//!   这是以内存换吞吐的显式取舍，长生命周期线程解码超大文本时需留意驻留内存；
//! - 草稿区被重入占用时（`ByteSink` 回调里再次调用编码器）退化为临时分配，而不是 panic。

use std::{cell::RefCell, char::DecodeUtf16Error};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{DataError, Result};

/// 默认草稿区大小。
pub const DEFAULT_SCRATCH_SIZE: usize = 8 * 1024;

/// 草稿区下限：至少能容纳一个完整的 UTF-8 字符。
const MIN_SCRATCH_SIZE: usize = 4;

const LENIENT_ENCODE_REPLACEMENT: char = '?';

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = RefCell::new(vec![0; DEFAULT_SCRATCH_SIZE]);
    static CHARS: RefCell<String> = const { RefCell::new(String::new()) };
}

/// 非法输入的处理策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncoderPolicy {
    /// 报告错误。
    Strict,
    /// 替换后继续。
    Lenient,
}

/// 字节写出端。
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

/// 字节读入端，返回实际读入的字节数，`0` 表示已无数据。
pub trait ByteSource {
    fn read_bytes(&mut self, dst: &mut [u8]) -> usize;
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl ByteSink for BytesMut {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_slice(bytes);
        Ok(())
    }
}

impl ByteSource for &[u8] {
    fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        let (head, tail) = self.split_at(n);
        dst[..n].copy_from_slice(head);
        *self = tail;
        n
    }
}

impl ByteSource for Bytes {
    fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        let head = self.split_to(n);
        dst[..n].copy_from_slice(&head);
        n
    }
}

/// 零分配 UTF-8 转码器。
///
/// 实例本身只携带策略与草稿区大小，状态全部位于线程本地存储，因此可以自由复制、跨线程传递。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZeroAllocationEncoder {
    policy: EncoderPolicy,
    scratch_size: usize,
}

impl ZeroAllocationEncoder {
    /// 批量零分配路径使用的宽松转码器。
    pub const LENIENT: ZeroAllocationEncoder = ZeroAllocationEncoder::new(EncoderPolicy::Lenient);
    /// 长度前缀文本读取使用的严格转码器。
    pub const STRICT: ZeroAllocationEncoder = ZeroAllocationEncoder::new(EncoderPolicy::Strict);

    pub const fn new(policy: EncoderPolicy) -> Self {
        Self {
            policy,
            scratch_size: DEFAULT_SCRATCH_SIZE,
        }
    }

    /// 调整每次调用使用的草稿区窗口，小于 4 字节时按 4 字节处理。
    pub fn with_scratch_size(mut self, scratch_size: usize) -> Self {
        self.scratch_size = scratch_size.max(MIN_SCRATCH_SIZE);
        self
    }

    pub fn policy(&self) -> EncoderPolicy {
        self.policy
    }

    pub fn scratch_size(&self) -> usize {
        self.scratch_size
    }

    /// 将 `text` 编码写入 `sink`，返回写出的字节数。
    pub fn encode_to(&self, text: &str, sink: &mut dyn ByteSink) -> Result<usize> {
        self.encode_units(text.chars().map(Ok), sink)
    }

    /// 将 UTF-16 码元编码写入 `sink`；孤立代理项按策略替换或报错。
    pub fn encode_utf16_to(&self, units: &[u16], sink: &mut dyn ByteSink) -> Result<usize> {
        self.encode_units(char::decode_utf16(units.iter().copied()), sink)
    }

    fn encode_units<I>(&self, units: I, sink: &mut dyn ByteSink) -> Result<usize>
    where
        I: Iterator<Item = core::result::Result<char, DecodeUtf16Error>>,
    {
        let mut units = units.peekable();
        with_scratch(self.scratch_size, |scratch| {
            let mut produced = 0usize;
            loop {
                let mut filled = 0usize;
                while let Some(unit) = units.peek() {
                    let ch = match unit {
                        Ok(ch) => *ch,
                        Err(err) => match self.policy {
                            EncoderPolicy::Strict => {
                                return Err(DataError::encoding(
                                    "UTF-8",
                                    format!("unpaired surrogate {:#06x}", err.unpaired_surrogate()),
                                ));
                            }
                            EncoderPolicy::Lenient => LENIENT_ENCODE_REPLACEMENT,
                        },
                    };
                    let width = ch.len_utf8();
                    if filled + width > scratch.len() {
                        break;
                    }
                    ch.encode_utf8(&mut scratch[filled..filled + width]);
                    filled += width;
                    units.next();
                }
                if filled > 0 {
                    sink.write_bytes(&scratch[..filled])?;
                    produced += filled;
                }
                if units.peek().is_none() {
                    return Ok(produced);
                }
            }
        })
    }

    /// 从 `source` 精确读取 `byte_length` 字节并解码为文本。
    ///
    /// 数据源提前耗尽时返回 [`DataError::OutOfRange`]。
    pub fn decode_from(&self, source: &mut dyn ByteSource, byte_length: usize) -> Result<String> {
        with_scratch(self.scratch_size, |scratch| {
            with_chars(|chars| {
                chars.clear();
                if chars.capacity() < byte_length {
                    let before = chars.capacity();
                    chars.reserve(byte_length);
                    trace!(
                        before,
                        after = chars.capacity(),
                        "thread-local decode buffer grown"
                    );
                }
                let mut remaining = byte_length;
                let mut carry = 0usize;
                while remaining > 0 {
                    let want = (scratch.len() - carry).min(remaining);
                    let read = source.read_bytes(&mut scratch[carry..carry + want]);
                    if read == 0 {
                        return Err(DataError::OutOfRange {
                            op: "ZeroAllocationEncoder::decode_from",
                            detail: format!(
                                "source exhausted with {remaining} of {byte_length} bytes outstanding"
                            ),
                        });
                    }
                    remaining -= read;
                    let available = carry + read;
                    carry = self.decode_chunk(&scratch[..available], chars, remaining == 0)?;
                    scratch.copy_within(available - carry..available, 0);
                }
                Ok(chars.as_str().to_owned())
            })
        })
    }

    /// 便捷入口：解码整段切片。
    pub fn decode_slice(&self, bytes: &[u8]) -> Result<String> {
        let mut source = bytes;
        self.decode_from(&mut source, bytes.len())
    }

    /// 解码一批字节，返回末尾尚不完整、需要与下一批拼接的字节数。
    fn decode_chunk(&self, bytes: &[u8], out: &mut String, last: bool) -> Result<usize> {
        let mut input = bytes;
        loop {
            let err = match core::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    return Ok(0);
                }
                Err(err) => err,
            };
            let valid = err.valid_up_to();
            if let Ok(prefix) = core::str::from_utf8(&input[..valid]) {
                out.push_str(prefix);
            }
            match err.error_len() {
                None if !last => return Ok(input.len() - valid),
                None => {
                    self.malformed(out, &input[valid..])?;
                    return Ok(0);
                }
                Some(len) => {
                    self.malformed(out, &input[valid..valid + len])?;
                    input = &input[valid + len..];
                }
            }
        }
    }

    fn malformed(&self, out: &mut String, bytes: &[u8]) -> Result<()> {
        match self.policy {
            EncoderPolicy::Strict => Err(DataError::encoding(
                "UTF-8",
                format!("malformed input {bytes:02x?}"),
            )),
            EncoderPolicy::Lenient => {
                out.push(char::REPLACEMENT_CHARACTER);
                Ok(())
            }
        }
    }
}

impl Default for ZeroAllocationEncoder {
    fn default() -> Self {
        Self::LENIENT
    }
}

fn with_scratch<R>(size: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut scratch) => {
            if scratch.len() < size {
                scratch.resize(size, 0);
            }
            f(&mut scratch[..size])
        }
        Err(_) => {
            let mut local = vec![0u8; size];
            f(&mut local)
        }
    })
}

fn with_chars<R>(f: impl FnOnce(&mut String) -> R) -> R {
    CHARS.with(|cell| match cell.try_borrow_mut() {
        Ok(mut chars) => f(&mut chars),
        Err(_) => f(&mut String::new()),
    })
}

/// 当前线程字符缓冲的容量，仅用于观测驻留内存。
pub fn thread_decode_capacity() -> usize {
    CHARS.with(|cell| cell.try_borrow().map(|chars| chars.capacity()).unwrap_or(0))
}
