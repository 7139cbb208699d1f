//! `Buf`：带显式可变性状态、可由堆数组或原生内存承载的字节缓冲契约。
//!
//! # 设计背景（Why）
//! - 代码生成产物只面向 `Buf` 的工厂/访问器与 `BufDataInput`/`BufDataOutput` 的读写面编程，
//!   不需要知道底层是堆数组还是原生内存；
//! - 视图（子区间）是零拷贝机制：构造视图从不复制字节，只有 `copy`/`copy_of_range` 会分配新的堆存储。
//!
//! # 逻辑解析（How）
//! - 存储形态收敛为两种：[`ByteListBuf`]（堆）与 [`MemorySegmentBuf`]（原生），
//!   由 [`AnyBuf`] 标签联合统一派发，每种形态都显式携带偏移/长度窗口；
//! - 多字节原语默认由 `read_bytes`/`write_bytes` 组合而成，存储实现可以覆盖为更快的批量路径；
//! - 比较类操作通过私有的 `Sealed::backing` 识别双方存储形态，选择三条优化路径之一。
//!
//! # 契约说明（What）
//! - 所有下标访问满足 `index + width <= size()`，否则返回 [`DataError::OutOfRange`]；
//! - 写操作在 `!is_mutable()` 时返回 [`DataError::ImmutableViolation`]；
//! - 任何越界都在写入第一个字节之前被检测，单个原语不会留下部分修改；
//! - 多字节原语默认大端，仅 `get_int_le`/`set_int_le` 为小端。
//!
//! # 风险提示（Trade-offs）
//! - 堆存储通过读写锁共享；持有 [`BufBytes::Borrowed`] 期间对同一可变存储写入会自旋等待，调用方应先释放借用；
//!   已冻结存储的写入在取锁前即失败，不受借用影响。

use core::{cmp::Ordering, ops::Deref};
use std::io;

use tracing::trace;

use crate::{
    charset::Charset,
    comparator::VariableLengthLexicographicComparator,
    config::DataBufConfig,
    encoder::EncoderPolicy,
    error::{DataError, Result, check_bounds, check_range},
    heap::{ByteListBuf, HeapArrayGuard},
    int52::{INT52_BYTES, Int52},
    native::MemorySegmentBuf,
    stream::{SafeByteArrayInputStream, SafeByteArrayOutputStream},
};

/// `write_to` 的默认分块大小，限制原生存储导出时的临时堆分配。
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 64 * 1024;

pub(crate) mod sealed {
    /// 封闭实现集合，并向 crate 内部暴露存储形态以选择比较路径。
    pub trait Sealed {
        fn backing(&self) -> super::BackingRef<'_>;
    }
}

use sealed::Sealed;

/// 存储形态的借用视图，仅 crate 内部用于派发。
#[doc(hidden)]
#[derive(Clone, Copy)]
pub enum BackingRef<'a> {
    Heap(&'a ByteListBuf),
    Native(&'a MemorySegmentBuf),
}

/// 以零拷贝或复制方式取得的连续字节。
///
/// - `Borrowed`：直接借用堆存储的底层数组（持有读锁）；
/// - `Owned`：不存在可借用的数组（原生存储、非零偏移视图等）时的独立副本。
pub enum BufBytes<'a> {
    Borrowed(HeapArrayGuard<'a>),
    Owned(Vec<u8>),
}

impl BufBytes<'_> {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, BufBytes::Borrowed(_))
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            BufBytes::Borrowed(guard) => guard.to_vec(),
            BufBytes::Owned(bytes) => bytes,
        }
    }
}

impl Deref for BufBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            BufBytes::Borrowed(guard) => guard,
            BufBytes::Owned(bytes) => bytes,
        }
    }
}

impl core::fmt::Debug for BufBytes<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufBytes")
            .field("borrowed", &self.is_borrowed())
            .field("len", &self.len())
            .finish()
    }
}

#[inline]
fn read_array<B: Buf + ?Sized, const N: usize>(buf: &B, index: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    buf.read_bytes(index, &mut out)?;
    Ok(out)
}

/// 统一的字节缓冲契约。
///
/// 实现集合是封闭的：[`ByteListBuf`]、[`MemorySegmentBuf`] 与 [`AnyBuf`]。
/// 需要与具体存储无关的调用方应使用泛型 `B: Buf` 或 [`AnyBuf`]。
pub trait Buf: Send + Sync + Sealed {
    /// 逻辑字节数。
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn is_mutable(&self) -> bool;

    fn get_byte(&self, index: usize) -> Result<u8>;

    fn set_byte(&self, index: usize, value: u8) -> Result<()>;

    /// 将 `[index, index + dst.len())` 复制到 `dst`。
    fn read_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        check_range("Buf::read_bytes", index, dst.len(), self.size())?;
        for (offset, slot) in dst.iter_mut().enumerate() {
            *slot = self.get_byte(index + offset)?;
        }
        Ok(())
    }

    /// 将 `src` 写入 `[index, index + src.len())`；校验全部通过后才开始写入。
    fn write_bytes(&self, index: usize, src: &[u8]) -> Result<()> {
        check_range("Buf::write_bytes", index, src.len(), self.size())?;
        if !self.is_mutable() {
            return Err(DataError::immutable("Buf::write_bytes"));
        }
        for (offset, value) in src.iter().enumerate() {
            self.set_byte(index + offset, *value)?;
        }
        Ok(())
    }

    fn get_boolean(&self, index: usize) -> Result<bool> {
        Ok(self.get_byte(index)? != 0)
    }

    fn set_boolean(&self, index: usize, value: bool) -> Result<()> {
        self.set_byte(index, u8::from(value))
    }

    fn get_short(&self, index: usize) -> Result<i16> {
        read_array(self, index).map(i16::from_be_bytes)
    }

    fn get_unsigned_short(&self, index: usize) -> Result<u16> {
        read_array(self, index).map(u16::from_be_bytes)
    }

    /// UTF-16 码元，与 `get_unsigned_short` 位模式一致。
    fn get_char(&self, index: usize) -> Result<u16> {
        self.get_unsigned_short(index)
    }

    fn get_int(&self, index: usize) -> Result<i32> {
        read_array(self, index).map(i32::from_be_bytes)
    }

    fn get_int_le(&self, index: usize) -> Result<i32> {
        read_array(self, index).map(i32::from_le_bytes)
    }

    fn get_long(&self, index: usize) -> Result<i64> {
        read_array(self, index).map(i64::from_be_bytes)
    }

    fn get_float(&self, index: usize) -> Result<f32> {
        read_array(self, index).map(|bytes| f32::from_bits(u32::from_be_bytes(bytes)))
    }

    fn get_double(&self, index: usize) -> Result<f64> {
        read_array(self, index).map(|bytes| f64::from_bits(u64::from_be_bytes(bytes)))
    }

    fn get_int52(&self, index: usize) -> Result<Int52> {
        read_array::<Self, INT52_BYTES>(self, index).map(|bytes| Int52::deserialize(&bytes))
    }

    fn set_short(&self, index: usize, value: i16) -> Result<()> {
        self.write_bytes(index, &value.to_be_bytes())
    }

    fn set_unsigned_short(&self, index: usize, value: u16) -> Result<()> {
        self.write_bytes(index, &value.to_be_bytes())
    }

    fn set_char(&self, index: usize, value: u16) -> Result<()> {
        self.set_unsigned_short(index, value)
    }

    fn set_int(&self, index: usize, value: i32) -> Result<()> {
        self.write_bytes(index, &value.to_be_bytes())
    }

    fn set_int_le(&self, index: usize, value: i32) -> Result<()> {
        self.write_bytes(index, &value.to_le_bytes())
    }

    fn set_long(&self, index: usize, value: i64) -> Result<()> {
        self.write_bytes(index, &value.to_be_bytes())
    }

    fn set_float(&self, index: usize, value: f32) -> Result<()> {
        self.write_bytes(index, &value.to_bits().to_be_bytes())
    }

    fn set_double(&self, index: usize, value: f64) -> Result<()> {
        self.write_bytes(index, &value.to_bits().to_be_bytes())
    }

    fn set_int52(&self, index: usize, value: Int52) -> Result<()> {
        self.write_bytes(index, &value.serialize())
    }

    /// 复制全部内容为独立的 `Vec<u8>`。
    fn to_byte_array(&self) -> Vec<u8>;

    /// 返回共享存储的窗口视图；全范围时原样返回（克隆句柄）。
    fn sub_list(&self, from: usize, to: usize) -> Result<Self>
    where
        Self: Sized;

    /// 总是构造新的定长窗口视图，即使覆盖全范围。
    fn sub_list_forced(&self, from: usize, to: usize) -> Result<Self>
    where
        Self: Sized;

    /// 复制 `[from, to)` 为独立的堆缓冲，即便源为原生存储。
    fn copy_of_range(&self, from: usize, to: usize) -> Result<ByteListBuf> {
        check_bounds("Buf::copy_of_range", from, to, self.size())?;
        let mut bytes = vec![0u8; to - from];
        self.read_bytes(from, &mut bytes)?;
        Ok(ByteListBuf::wrap(bytes))
    }

    fn copy(&self) -> ByteListBuf {
        ByteListBuf::wrap(self.to_byte_array())
    }

    /// 幂等冻结。堆存储会翻转所有共享视图的可变标志；原生存储保持不变。
    fn freeze(&self);

    /// 精确长度的字节，能借用则借用，否则复制。
    fn as_array(&self) -> BufBytes<'_> {
        self.as_array_strict()
            .unwrap_or_else(|| BufBytes::Owned(self.to_byte_array()))
    }

    /// 仅当存在恰好等长的底层数组时零拷贝返回。
    fn as_array_strict(&self) -> Option<BufBytes<'_>>;

    /// 从窗口起点开始、长度至少为 `size()` 的字节；调用方需以 `size()` 截断。
    fn as_unbounded_array(&self) -> BufBytes<'_> {
        self.as_unbounded_array_strict()
            .unwrap_or_else(|| BufBytes::Owned(self.to_byte_array()))
    }

    /// 仅当存在起点对齐、长度不小于 `size()` 的底层数组时零拷贝返回。
    fn as_unbounded_array_strict(&self) -> Option<BufBytes<'_>>;

    /// 比较 `self[a_from..a_from + length]` 与 `other[b_from..b_from + length]`。
    fn range_equals(&self, a_from: usize, other: &dyn Buf, b_from: usize, length: usize) -> Result<bool> {
        check_range("Buf::range_equals", a_from, length, self.size())?;
        check_range("Buf::range_equals", b_from, length, other.size())?;
        Ok(match (self.backing(), other.backing()) {
            (BackingRef::Native(a), BackingRef::Native(b)) => a
                .segment()
                .as_slice(a_from, length)?
                .mismatch(&b.segment().as_slice(b_from, length)?)
                .is_none(),
            (BackingRef::Native(a), BackingRef::Heap(b)) => {
                let segment = a.segment().as_slice(a_from, length)?;
                b.with_window(|bytes| segment.mismatch_slice(&bytes[b_from..b_from + length]).is_none())
            }
            (BackingRef::Heap(a), BackingRef::Native(b)) => {
                let segment = b.segment().as_slice(b_from, length)?;
                a.with_window(|bytes| segment.mismatch_slice(&bytes[a_from..a_from + length]).is_none())
            }
            (BackingRef::Heap(a), BackingRef::Heap(b)) => a.with_window(|left| {
                b.with_window(|right| left[a_from..a_from + length] == right[b_from..b_from + length])
            }),
        })
    }

    /// 与字节数组的区间比较。
    fn range_equals_array(&self, a_from: usize, other: &[u8], b_from: usize, length: usize) -> Result<bool> {
        check_range("Buf::range_equals_array", a_from, length, self.size())?;
        check_range("Buf::range_equals_array", b_from, length, other.len())?;
        let other = &other[b_from..b_from + length];
        Ok(match self.backing() {
            BackingRef::Native(a) => a.segment().as_slice(a_from, length)?.mismatch_slice(other).is_none(),
            BackingRef::Heap(a) => a.with_window(|bytes| &bytes[a_from..a_from + length] == other),
        })
    }

    /// 变长字典序比较：先比长度，再逐字节无符号比较。
    fn compare_to(&self, other: &dyn Buf) -> Ordering {
        let comparator = VariableLengthLexicographicComparator::INSTANCE;
        let (a_len, b_len) = (self.size(), other.size());
        if a_len != b_len {
            return a_len.cmp(&b_len);
        }
        let first = match first_mismatch(self.backing(), other.backing(), a_len) {
            Ok(Some(index)) => match (self.get_byte(index), other.get_byte(index)) {
                (Ok(x), Ok(y)) => Some((x, y)),
                _ => None,
            },
            _ => None,
        };
        comparator.compare_with_mismatch(a_len, b_len, first)
    }

    /// 位置流读取视图：堆存储直接别名底层数组，原生存储先物化为堆副本。
    fn binary_input_stream(&self) -> SafeByteArrayInputStream;

    /// 覆盖 `[from, to)` 的位置写出流。
    fn binary_output_stream(&self, from: usize, to: usize) -> Result<SafeByteArrayOutputStream>;

    /// 以默认分块大小把全部字节写入 `sink`。
    fn write_to(&self, sink: &mut dyn io::Write) -> Result<()> {
        self.write_to_chunked(sink, DEFAULT_WRITE_CHUNK_SIZE)
    }

    /// 按配置的 `write_chunk_size` 分块写出。
    fn write_to_with(&self, sink: &mut dyn io::Write, config: &DataBufConfig) -> Result<()> {
        self.write_to_chunked(sink, config.write_chunk_size)
    }

    /// 分块导出：每次最多物化 `chunk_size` 字节，临时分配与缓冲大小无关。
    fn write_to_chunked(&self, sink: &mut dyn io::Write, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(DataError::invalid_argument("write chunk size must be positive"));
        }
        let size = self.size();
        let mut chunk = vec![0u8; chunk_size.min(size)];
        let mut offset = 0;
        while offset < size {
            let n = chunk.len().min(size - offset);
            self.read_bytes(offset, &mut chunk[..n])?;
            sink.write_all(&chunk[..n])?;
            offset += n;
            trace!(offset, size, "buffer chunk flushed");
        }
        Ok(())
    }

    /// 以宽松策略解码 `[index, index + length)`。
    fn get_string(&self, index: usize, length: usize, charset: Charset) -> Result<String> {
        check_range("Buf::get_string", index, length, self.size())?;
        let mut bytes = vec![0u8; length];
        self.read_bytes(index, &mut bytes)?;
        charset.decode(&bytes, EncoderPolicy::Lenient)
    }

    fn to_string_with(&self, charset: Charset) -> Result<String> {
        self.get_string(0, self.size(), charset)
    }
}

/// 等长区间上首个不同字节的位置。
fn first_mismatch(a: BackingRef<'_>, b: BackingRef<'_>, len: usize) -> Result<Option<usize>> {
    Ok(match (a, b) {
        (BackingRef::Native(x), BackingRef::Native(y)) => x
            .segment()
            .as_slice(0, len)?
            .mismatch(&y.segment().as_slice(0, len)?),
        (BackingRef::Native(x), BackingRef::Heap(y)) => {
            let segment = x.segment().as_slice(0, len)?;
            y.with_window(|bytes| segment.mismatch_slice(&bytes[..len]))
        }
        (BackingRef::Heap(x), BackingRef::Native(y)) => {
            let segment = y.segment().as_slice(0, len)?;
            x.with_window(|bytes| segment.mismatch_slice(&bytes[..len]))
        }
        (BackingRef::Heap(x), BackingRef::Heap(y)) => x.with_window(|left| {
            y.with_window(|right| left[..len].iter().zip(&right[..len]).position(|(l, r)| l != r))
        }),
    })
}

/// 存储无关的缓冲句柄。
#[derive(Clone, Debug)]
pub enum AnyBuf {
    Heap(ByteListBuf),
    Native(MemorySegmentBuf),
}

macro_rules! dispatch {
    ($self:ident, $buf:ident => $body:expr) => {
        match $self {
            AnyBuf::Heap($buf) => $body,
            AnyBuf::Native($buf) => $body,
        }
    };
}

impl AnyBuf {
    pub fn is_native(&self) -> bool {
        matches!(self, AnyBuf::Native(_))
    }

    /// 堆存储直接返回，原生存储复制为堆缓冲。
    pub fn into_heap(self) -> ByteListBuf {
        match self {
            AnyBuf::Heap(buf) => buf,
            AnyBuf::Native(buf) => buf.copy(),
        }
    }
}

impl From<ByteListBuf> for AnyBuf {
    fn from(buf: ByteListBuf) -> Self {
        AnyBuf::Heap(buf)
    }
}

impl From<MemorySegmentBuf> for AnyBuf {
    fn from(buf: MemorySegmentBuf) -> Self {
        AnyBuf::Native(buf)
    }
}

impl Sealed for AnyBuf {
    fn backing(&self) -> BackingRef<'_> {
        dispatch!(self, buf => buf.backing())
    }
}

impl Buf for AnyBuf {
    fn size(&self) -> usize {
        dispatch!(self, buf => buf.size())
    }

    fn is_mutable(&self) -> bool {
        dispatch!(self, buf => buf.is_mutable())
    }

    fn get_byte(&self, index: usize) -> Result<u8> {
        dispatch!(self, buf => buf.get_byte(index))
    }

    fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        dispatch!(self, buf => buf.set_byte(index, value))
    }

    fn read_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        dispatch!(self, buf => buf.read_bytes(index, dst))
    }

    fn write_bytes(&self, index: usize, src: &[u8]) -> Result<()> {
        dispatch!(self, buf => buf.write_bytes(index, src))
    }

    fn get_int(&self, index: usize) -> Result<i32> {
        dispatch!(self, buf => buf.get_int(index))
    }

    fn get_long(&self, index: usize) -> Result<i64> {
        dispatch!(self, buf => buf.get_long(index))
    }

    fn set_int(&self, index: usize, value: i32) -> Result<()> {
        dispatch!(self, buf => buf.set_int(index, value))
    }

    fn set_long(&self, index: usize, value: i64) -> Result<()> {
        dispatch!(self, buf => buf.set_long(index, value))
    }

    fn to_byte_array(&self) -> Vec<u8> {
        dispatch!(self, buf => buf.to_byte_array())
    }

    fn sub_list(&self, from: usize, to: usize) -> Result<Self> {
        match self {
            AnyBuf::Heap(buf) => buf.sub_list(from, to).map(AnyBuf::Heap),
            AnyBuf::Native(buf) => buf.sub_list(from, to).map(AnyBuf::Native),
        }
    }

    fn sub_list_forced(&self, from: usize, to: usize) -> Result<Self> {
        match self {
            AnyBuf::Heap(buf) => buf.sub_list_forced(from, to).map(AnyBuf::Heap),
            AnyBuf::Native(buf) => buf.sub_list_forced(from, to).map(AnyBuf::Native),
        }
    }

    fn freeze(&self) {
        dispatch!(self, buf => buf.freeze())
    }

    fn as_array_strict(&self) -> Option<BufBytes<'_>> {
        dispatch!(self, buf => buf.as_array_strict())
    }

    fn as_unbounded_array_strict(&self) -> Option<BufBytes<'_>> {
        dispatch!(self, buf => buf.as_unbounded_array_strict())
    }

    fn binary_input_stream(&self) -> SafeByteArrayInputStream {
        dispatch!(self, buf => buf.binary_input_stream())
    }

    fn binary_output_stream(&self, from: usize, to: usize) -> Result<SafeByteArrayOutputStream> {
        dispatch!(self, buf => buf.binary_output_stream(from, to))
    }

    fn write_to_chunked(&self, sink: &mut dyn io::Write, chunk_size: usize) -> Result<()> {
        dispatch!(self, buf => buf.write_to_chunked(sink, chunk_size))
    }

    fn get_string(&self, index: usize, length: usize, charset: Charset) -> Result<String> {
        dispatch!(self, buf => buf.get_string(index, length, charset))
    }
}

impl PartialEq for AnyBuf {
    fn eq(&self, other: &Self) -> bool {
        self.compare_to(other) == Ordering::Equal
    }
}

impl Eq for AnyBuf {}

impl PartialOrd for AnyBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AnyBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

impl core::hash::Hash for AnyBuf {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        let bytes = self.as_array();
        bytes[..].hash(state);
    }
}
