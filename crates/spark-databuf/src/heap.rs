//! 堆数组承载的 [`Buf`] 实现。
//!
//! # 设计动机（Why）
//! - 绝大多数序列化场景在堆上完成：生成的数据类把字段写入可增长的字节列表，随后冻结并跨线程共享；
//! - 子视图必须零拷贝，且冻结要对“冻结之前已创建的视图”同样可见，因此可变标志不能是每个实例各自的布尔值。
//!
//! # 结构设计（How）
//! - `HeapStore` 以 `Arc` 共享：`bytes` 为 `spin::RwLock<Vec<u8>>`，`mutable` 为原子布尔；
//!   所有视图持有同一个 `Arc`，`freeze` 翻转一次即对全部视图生效；
//! - `ByteListBuf` 自身只携带 `offset` 与 `Window`：根列表为 `Growable`（长度随底层增长），
//!   视图为 `Fixed(len)`，构造后窗口不再变化；
//! - 底层 `Vec` 只增不减，因此任何已创建视图的窗口始终有效。
//!
//! # 契约说明（What）
//! - `wrap` 接管调用方的 `Vec<u8>`，不复制；
//! - 写入先校验范围、再校验可变性，二者均通过才取写锁修改字节，因此冻结后的写入即使遇上未释放的借用也立即失败；
//! - 并发规则：冻结后可任意并发读取；未冻结时同一时刻只允许一个写者，由调用方保证。

use core::{cmp::Ordering, fmt, hash, ops::Deref, ops::Range};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};

use spin::{RwLock, RwLockReadGuard};

use crate::{
    buf::{BackingRef, Buf, BufBytes, sealed::Sealed},
    charset::Charset,
    encoder::EncoderPolicy,
    error::{DataError, Result, check_bounds, check_range},
    stream::{SafeByteArrayInputStream, SafeByteArrayOutputStream},
};

struct HeapStore {
    bytes: RwLock<Vec<u8>>,
    mutable: AtomicBool,
}

impl HeapStore {
    fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            bytes: RwLock::new(bytes),
            mutable: AtomicBool::new(true),
        })
    }

    #[inline]
    fn is_mutable(&self) -> bool {
        self.mutable.load(AtomicOrdering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Window {
    Growable,
    Fixed(usize),
}

/// 借用堆存储底层数组的读守卫。
pub struct HeapArrayGuard<'a> {
    guard: RwLockReadGuard<'a, Vec<u8>>,
    range: Range<usize>,
}

impl Deref for HeapArrayGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.range.clone()]
    }
}

/// 堆字节列表缓冲。
///
/// 克隆只复制句柄（共享同一存储），复制内容请使用 [`Buf::copy`]。
#[derive(Clone)]
pub struct ByteListBuf {
    store: Arc<HeapStore>,
    offset: usize,
    window: Window,
}

impl ByteListBuf {
    /// 空的可增长列表。
    pub fn create() -> Self {
        Self::wrap(Vec::new())
    }

    /// 预留 `capacity` 的空列表。
    pub fn with_capacity(capacity: usize) -> Self {
        Self::wrap(Vec::with_capacity(capacity))
    }

    /// `len` 个零字节。
    pub fn create_zeroes(len: usize) -> Self {
        Self::wrap(vec![0; len])
    }

    pub fn copy_of(bytes: &[u8]) -> Self {
        Self::wrap(bytes.to_vec())
    }

    /// 接管 `bytes` 作为根列表，不复制。
    pub fn wrap(bytes: Vec<u8>) -> Self {
        Self {
            store: HeapStore::new(bytes),
            offset: 0,
            window: Window::Growable,
        }
    }

    /// 接管 `bytes` 并只暴露 `[from, to)` 窗口。
    pub fn wrap_range(bytes: Vec<u8>, from: usize, to: usize) -> Result<Self> {
        check_bounds("ByteListBuf::wrap_range", from, to, bytes.len())?;
        Ok(Self {
            store: HeapStore::new(bytes),
            offset: from,
            window: Window::Fixed(to - from),
        })
    }

    /// 是否为定长窗口视图。
    pub fn is_view(&self) -> bool {
        matches!(self.window, Window::Fixed(_))
    }

    /// 是否与 `other` 共享同一底层存储。
    pub fn shares_storage_with(&self, other: &ByteListBuf) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }

    pub fn add(&self, value: u8) -> Result<()> {
        self.add_all(&[value])
    }

    /// 在根列表末尾追加字节；视图窗口固定，不支持增长。
    pub fn add_all(&self, bytes: &[u8]) -> Result<()> {
        if self.is_view() {
            return Err(DataError::unsupported(
                "ByteListBuf::add_all",
                "fixed-window views cannot grow",
            ));
        }
        if !self.store.is_mutable() {
            return Err(DataError::immutable("ByteListBuf::add_all"));
        }
        self.store.bytes.write().extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    fn end(&self, store_len: usize) -> usize {
        match self.window {
            Window::Growable => store_len,
            Window::Fixed(len) => self.offset + len,
        }
    }

    /// 在读锁内访问窗口字节。
    pub(crate) fn with_window<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.store.bytes.read();
        let end = self.end(guard.len());
        f(&guard[self.offset..end])
    }

    fn read_window<R>(
        &self,
        op: &'static str,
        index: usize,
        width: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R> {
        self.with_window(|window| {
            check_range(op, index, width, window.len())?;
            Ok(f(&window[index..index + width]))
        })
    }

    fn write_window(
        &self,
        op: &'static str,
        index: usize,
        width: usize,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<()> {
        // 校验只取短读锁，可与未释放的借用守卫共存；窗口只增不减，校验结果在取写锁后仍成立。
        check_range(op, index, width, self.size())?;
        if !self.store.is_mutable() {
            return Err(DataError::immutable(op));
        }
        let mut guard = self.store.bytes.write();
        let start = self.offset + index;
        f(&mut guard[start..start + width]);
        Ok(())
    }

    /// 以当前长度固定窗口的视图，供位置流使用。
    pub(crate) fn fixed_view(&self) -> ByteListBuf {
        ByteListBuf {
            store: Arc::clone(&self.store),
            offset: self.offset,
            window: Window::Fixed(self.size()),
        }
    }

    fn borrow_array(&self, exact: bool) -> Option<BufBytes<'_>> {
        if self.offset != 0 {
            return None;
        }
        let guard = self.store.bytes.read();
        let end = self.end(guard.len());
        let len = guard.len();
        if exact && end != len {
            return None;
        }
        Some(BufBytes::Borrowed(HeapArrayGuard {
            guard,
            range: 0..len,
        }))
    }
}

impl Default for ByteListBuf {
    fn default() -> Self {
        Self::create()
    }
}

impl Sealed for ByteListBuf {
    fn backing(&self) -> BackingRef<'_> {
        BackingRef::Heap(self)
    }
}

impl Buf for ByteListBuf {
    fn size(&self) -> usize {
        match self.window {
            Window::Fixed(len) => len,
            Window::Growable => self.store.bytes.read().len() - self.offset,
        }
    }

    fn is_mutable(&self) -> bool {
        self.store.is_mutable()
    }

    fn get_byte(&self, index: usize) -> Result<u8> {
        self.read_window("ByteListBuf::get_byte", index, 1, |bytes| bytes[0])
    }

    fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        self.write_window("ByteListBuf::set_byte", index, 1, |bytes| bytes[0] = value)
    }

    fn read_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.read_window("ByteListBuf::read_bytes", index, dst.len(), |bytes| {
            dst.copy_from_slice(bytes)
        })
    }

    fn write_bytes(&self, index: usize, src: &[u8]) -> Result<()> {
        self.write_window("ByteListBuf::write_bytes", index, src.len(), |bytes| {
            bytes.copy_from_slice(src)
        })
    }

    fn to_byte_array(&self) -> Vec<u8> {
        self.with_window(<[u8]>::to_vec)
    }

    fn sub_list(&self, from: usize, to: usize) -> Result<Self> {
        let size = self.size();
        check_bounds("ByteListBuf::sub_list", from, to, size)?;
        if from == 0 && to == size {
            return Ok(self.clone());
        }
        self.sub_list_forced(from, to)
    }

    fn sub_list_forced(&self, from: usize, to: usize) -> Result<Self> {
        check_bounds("ByteListBuf::sub_list_forced", from, to, self.size())?;
        Ok(ByteListBuf {
            store: Arc::clone(&self.store),
            offset: self.offset + from,
            window: Window::Fixed(to - from),
        })
    }

    fn freeze(&self) {
        self.store.mutable.store(false, AtomicOrdering::Release);
    }

    fn as_array_strict(&self) -> Option<BufBytes<'_>> {
        self.borrow_array(true)
    }

    fn as_unbounded_array_strict(&self) -> Option<BufBytes<'_>> {
        self.borrow_array(false)
    }

    fn binary_input_stream(&self) -> SafeByteArrayInputStream {
        SafeByteArrayInputStream::new(self.fixed_view())
    }

    fn binary_output_stream(&self, from: usize, to: usize) -> Result<SafeByteArrayOutputStream> {
        let view = self.sub_list_forced(from, to)?;
        if !self.is_mutable() {
            return Err(DataError::immutable("ByteListBuf::binary_output_stream"));
        }
        Ok(SafeByteArrayOutputStream::over_heap(view))
    }

    /// 堆存储直接写出整个窗口，无需分块物化。
    fn write_to_chunked(&self, sink: &mut dyn io::Write, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(DataError::invalid_argument("write chunk size must be positive"));
        }
        self.with_window(|bytes| sink.write_all(bytes))?;
        Ok(())
    }

    fn get_string(&self, index: usize, length: usize, charset: Charset) -> Result<String> {
        self.read_window("ByteListBuf::get_string", index, length, |bytes| {
            charset.decode(bytes, EncoderPolicy::Lenient)
        })?
    }
}

impl fmt::Debug for ByteListBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteListBuf")
            .field("offset", &self.offset)
            .field("size", &self.size())
            .field("view", &self.is_view())
            .field("mutable", &self.is_mutable())
            .finish()
    }
}

impl PartialEq for ByteListBuf {
    fn eq(&self, other: &Self) -> bool {
        self.with_window(|left| other.with_window(|right| left == right))
    }
}

impl Eq for ByteListBuf {}

impl PartialOrd for ByteListBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteListBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

impl hash::Hash for ByteListBuf {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.with_window(|bytes| bytes.hash(state));
    }
}

impl From<Vec<u8>> for ByteListBuf {
    fn from(bytes: Vec<u8>) -> Self {
        Self::wrap(bytes)
    }
}

impl From<&[u8]> for ByteListBuf {
    fn from(bytes: &[u8]) -> Self {
        Self::copy_of(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_view_survives_root_growth() {
        let root = ByteListBuf::copy_of(&[1, 2, 3]);
        let view = root.sub_list(1, 3).unwrap();
        root.add_all(&[4, 5, 6, 7, 8, 9, 10]).unwrap();
        assert_eq!(view.to_byte_array(), vec![2, 3]);
        assert_eq!(root.size(), 10);
    }

    #[test]
    fn strict_array_requires_exact_window() {
        let root = ByteListBuf::copy_of(&[1, 2, 3, 4]);
        assert!(root.as_array_strict().is_some());
        let head = root.sub_list(0, 2).unwrap();
        assert!(head.as_array_strict().is_none());
        let unbounded = head.as_unbounded_array_strict().unwrap();
        assert_eq!(&unbounded[..], &[1, 2, 3, 4]);
        let tail = root.sub_list(2, 4).unwrap();
        assert!(tail.as_unbounded_array_strict().is_none());
        assert!(!tail.as_array().is_borrowed());
    }

    #[test]
    fn frozen_write_fails_while_array_is_borrowed() {
        let buf = ByteListBuf::copy_of(&[1, 2, 3]);
        buf.freeze();
        let borrowed = buf.as_array();
        assert!(borrowed.is_borrowed());
        assert!(matches!(
            buf.set_byte(0, 9),
            Err(DataError::ImmutableViolation { .. })
        ));
        assert!(matches!(
            buf.set_byte(7, 9),
            Err(DataError::OutOfRange { .. })
        ));
        assert_eq!(&borrowed[..], &[1, 2, 3]);
    }
}
