//! 原生（堆外）内存承载的 [`Buf`] 实现。
//!
//! # 设计背景（Why）
//! - 与外部进程、内存映射文件或 FFI 共享的数据并不位于 Rust 堆上；把它们复制进 `Vec` 再解析，
//!   会在大消息上产生一次完整拷贝；
//! - 因此提供“外部内存句柄” [`MemorySegment`]：只暴露带边界检查的读、写、复制与 mismatch 探针，
//!   所有裸指针运算都封装在句柄内部。
//!
//! # 结构设计（How）
//! - `Region` 描述一段连续内存及其释放方式：由 [`NativeArena`] 分配的区域在最后一个引用释放时归还，
//!   经 [`MemorySegment::from_raw_parts`] 接入的外部内存则从不释放；
//! - [`MemorySegment`] = `Arc<Region>` + 偏移/长度窗口 + 只读标志，切片零拷贝；
//! - [`MemorySegmentBuf`] 在句柄之上实现 [`Buf`]。
//!
//! # 契约说明（What）
//! - 可变性只跟随区域自身的只读属性：`freeze` 被接受但不会把可写区域变为只读，
//!   这一保证弱于堆缓冲，是有意保留的行为；
//! - 外部内存的生命周期由调用方保证长于所有派生句柄，违反即未定义行为，本层不做运行时检测；
//! - 区域内每个字节都以 `Relaxed` 原子操作读写，跨线程共享句柄并发读写不构成数据竞争；
//!   但多字节值不是整体原子的，并发写同一区间可能读到新旧字节混合的结果。
//!
//! # 风险与取舍（Trade-offs）
//! - mismatch 探针把逐字节原子读取拼成 8 字节字后比较，命中差异再以 `trailing_zeros` 定位具体字节；
//!   逐字节原子访问放弃了 `memcpy` 级的批量拷贝，换取安全 API 下的无数据竞争保证；
//! - `Region` 通过 `unsafe impl Send/Sync` 跨线程共享，其正确性依赖上述原子访问纪律。

use core::{cmp::Ordering, fmt, hash, ptr::NonNull};
use std::{
    alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error},
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicUsize, Ordering as AtomicOrdering},
    },
};

use tracing::debug;

use crate::{
    buf::{BackingRef, Buf, BufBytes, sealed::Sealed},
    error::{DataError, Result, check_bounds, check_range},
    heap::ByteListBuf,
    stream::{SafeByteArrayInputStream, SafeByteArrayOutputStream},
};

/// 区域起始地址的对齐。
const REGION_ALIGN: usize = 8;

const WORD: usize = core::mem::size_of::<u64>();

#[derive(Default)]
struct ArenaStats {
    allocated_bytes: AtomicUsize,
    live_regions: AtomicUsize,
}

enum Release {
    /// 零长度区域，不持有分配。
    Empty,
    Arena {
        layout: Layout,
        stats: Arc<ArenaStats>,
    },
    /// 外部内存，由调用方负责生命周期。
    Foreign,
}

struct Region {
    ptr: NonNull<u8>,
    len: usize,
    release: Release,
}

// SAFETY: `Region` 只是一段内存的地址与长度；所有访问都经过 `MemorySegment` 的边界检查，
// 且只通过 `AtomicU8` 进行，跨线程并发读写不产生数据竞争。
unsafe impl Send for Region {}
// SAFETY: 参见 `Send`。
unsafe impl Sync for Region {}

impl Drop for Region {
    fn drop(&mut self) {
        if let Release::Arena { layout, stats } = &self.release {
            // SAFETY: `ptr` 由 `alloc_zeroed(layout)` 分配，且仅在最后一个 `Arc<Region>` 释放时归还一次。
            unsafe { dealloc(self.ptr.as_ptr(), *layout) };
            stats.allocated_bytes.fetch_sub(self.len, AtomicOrdering::Relaxed);
            stats.live_regions.fetch_sub(1, AtomicOrdering::Relaxed);
            debug!(len = self.len, "native region released");
        }
    }
}

/// 原生内存分配器。
///
/// 分配出的区域按引用计数管理：最后一个引用该区域的 [`MemorySegment`] 释放时内存归还，
/// 因此安全 API 派生的句柄不会悬垂。克隆共享同一组统计。
#[derive(Clone, Default)]
pub struct NativeArena {
    stats: Arc<ArenaStats>,
}

impl NativeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配 `len` 字节的零填充可写区域。
    pub fn allocate(&self, len: usize) -> Result<MemorySegment> {
        if len == 0 {
            return Ok(MemorySegment::from_region(Region {
                ptr: NonNull::dangling(),
                len: 0,
                release: Release::Empty,
            }));
        }
        let layout = Layout::from_size_align(len, REGION_ALIGN)
            .map_err(|err| DataError::invalid_argument(format!("native allocation of {len} bytes: {err}")))?;
        // SAFETY: `layout` 尺寸非零。
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(layout));
        self.stats.allocated_bytes.fetch_add(len, AtomicOrdering::Relaxed);
        self.stats.live_regions.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(len, "native region allocated");
        Ok(MemorySegment::from_region(Region {
            ptr,
            len,
            release: Release::Arena {
                layout,
                stats: Arc::clone(&self.stats),
            },
        }))
    }

    /// 分配区域并复制 `bytes`。
    pub fn allocate_from(&self, bytes: &[u8]) -> Result<MemorySegment> {
        let segment = self.allocate(bytes.len())?;
        segment.copy_from(0, bytes)?;
        Ok(segment)
    }

    /// 当前仍存活的已分配字节数。
    pub fn allocated_bytes(&self) -> usize {
        self.stats.allocated_bytes.load(AtomicOrdering::Relaxed)
    }

    pub fn live_regions(&self) -> usize {
        self.stats.live_regions.load(AtomicOrdering::Relaxed)
    }
}

impl fmt::Debug for NativeArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeArena")
            .field("allocated_bytes", &self.allocated_bytes())
            .field("live_regions", &self.live_regions())
            .finish()
    }
}

/// 外部内存句柄：区域 + 窗口 + 只读标志。
#[derive(Clone)]
pub struct MemorySegment {
    region: Arc<Region>,
    offset: usize,
    len: usize,
    read_only: bool,
}

impl MemorySegment {
    fn from_region(region: Region) -> Self {
        let len = region.len;
        Self {
            region: Arc::new(region),
            offset: 0,
            len,
            read_only: false,
        }
    }

    /// 接入外部管理的内存。
    ///
    /// # Safety
    ///
    /// 调用方必须保证：
    /// - `ptr` 指向至少 `len` 字节的有效内存，且在返回的句柄及其所有派生句柄、缓冲、视图存活期间保持有效；
    /// - `read_only == false` 时，该内存可写，且不存在与之重叠的 Rust 引用；
    /// - 句柄存活期间，外部代码对该内存的并发访问同样只能是原子操作；
    /// - 外部所有者（Arena）先于派生句柄释放内存属于未定义行为，本层无法检测。
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize, read_only: bool) -> Self {
        Self {
            region: Arc::new(Region {
                ptr,
                len,
                release: Release::Foreign,
            }),
            offset: 0,
            len,
            read_only,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// 同一区域的只读句柄。
    pub fn as_read_only(&self) -> MemorySegment {
        MemorySegment {
            read_only: true,
            ..self.clone()
        }
    }

    /// `[offset, offset + len)` 的零拷贝子句柄。
    pub fn as_slice(&self, offset: usize, len: usize) -> Result<MemorySegment> {
        check_range("MemorySegment::as_slice", offset, len, self.len)?;
        Ok(MemorySegment {
            region: Arc::clone(&self.region),
            offset: self.offset + offset,
            len,
            read_only: self.read_only,
        })
    }

    /// 窗口内 `index` 处的地址；调用方须已完成边界检查。
    #[inline]
    fn address(&self, index: usize) -> *mut u8 {
        debug_assert!(self.offset + index <= self.region.len);
        // SAFETY: 调用点 `cell` 要求 `index < self.len`，而 `offset + len <= region.len`
        // 在构造时保证，因此结果位于区域之内。
        unsafe { self.region.ptr.as_ptr().add(self.offset + index) }
    }

    /// 窗口内 `index` 处字节的原子视图；调用方须已校验 `index < self.len`。
    #[inline]
    fn cell(&self, index: usize) -> &AtomicU8 {
        debug_assert!(index < self.len);
        // SAFETY: 地址位于区域之内且非空；`AtomicU8` 与 `u8` 布局相同、无额外对齐要求；
        // 区域在 `self` 持有的 `Arc<Region>` 存活期间有效，且所有访问都经由原子操作。
        unsafe { AtomicU8::from_ptr(self.address(index)) }
    }

    #[inline]
    fn load(&self, index: usize) -> u8 {
        self.cell(index).load(AtomicOrdering::Relaxed)
    }

    fn load_into(&self, index: usize, dst: &mut [u8]) {
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = self.load(index + i);
        }
    }

    fn store_from(&self, index: usize, src: &[u8]) {
        for (i, &byte) in src.iter().enumerate() {
            self.cell(index + i).store(byte, AtomicOrdering::Relaxed);
        }
    }

    fn ensure_writable(&self, op: &'static str) -> Result<()> {
        if self.read_only {
            return Err(DataError::immutable(op));
        }
        Ok(())
    }

    pub fn get_byte(&self, index: usize) -> Result<u8> {
        check_range("MemorySegment::get_byte", index, 1, self.len)?;
        Ok(self.load(index))
    }

    pub fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        check_range("MemorySegment::set_byte", index, 1, self.len)?;
        self.ensure_writable("MemorySegment::set_byte")?;
        self.cell(index).store(value, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// 按原生布局读取定长字节组，不要求对齐。
    pub fn read_array<const N: usize>(&self, index: usize) -> Result<[u8; N]> {
        check_range("MemorySegment::read_array", index, N, self.len)?;
        let mut bytes = [0u8; N];
        self.load_into(index, &mut bytes);
        Ok(bytes)
    }

    pub fn write_array<const N: usize>(&self, index: usize, bytes: [u8; N]) -> Result<()> {
        check_range("MemorySegment::write_array", index, N, self.len)?;
        self.ensure_writable("MemorySegment::write_array")?;
        self.store_from(index, &bytes);
        Ok(())
    }

    /// 复制 `[index, index + dst.len())` 到 `dst`。
    pub fn copy_to(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        check_range("MemorySegment::copy_to", index, dst.len(), self.len)?;
        self.load_into(index, dst);
        Ok(())
    }

    /// 将 `src` 写入 `[index, index + src.len())`。
    pub fn copy_from(&self, index: usize, src: &[u8]) -> Result<()> {
        check_range("MemorySegment::copy_from", index, src.len(), self.len)?;
        self.ensure_writable("MemorySegment::copy_from")?;
        self.store_from(index, src);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.prefix_to_vec(self.len)
    }

    /// 窗口前 `len` 字节的副本，`len` 超出窗口时截断到窗口长度。
    pub fn prefix_to_vec(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len.min(self.len)];
        self.load_into(0, &mut out);
        out
    }

    /// 首个不同字节的位置；长度不同且一方为另一方前缀时返回较短长度，完全相同返回 `None`。
    pub fn mismatch(&self, other: &MemorySegment) -> Option<usize> {
        let common = self.len.min(other.len);
        mismatch_by(common, |i| self.load(i), |i| other.load(i))
            .or((self.len != other.len).then_some(common))
    }

    /// 与堆数组的 mismatch 探针，语义同 [`MemorySegment::mismatch`]。
    pub fn mismatch_slice(&self, other: &[u8]) -> Option<usize> {
        let common = self.len.min(other.len());
        mismatch_by(common, |i| self.load(i), |i| other[i])
            .or((self.len != other.len()).then_some(common))
    }
}

/// 按 8 字节字宽比较两段长度至少为 `len` 的字节序列，返回首个不同字节的下标。
fn mismatch_by(len: usize, a: impl Fn(usize) -> u8, b: impl Fn(usize) -> u8) -> Option<usize> {
    let mut index = 0;
    while index + WORD <= len {
        let x = u64::from_le_bytes(core::array::from_fn(|i| a(index + i)));
        let y = u64::from_le_bytes(core::array::from_fn(|i| b(index + i)));
        let diff = x ^ y;
        if diff != 0 {
            return Some(index + (diff.trailing_zeros() / 8) as usize);
        }
        index += WORD;
    }
    (index..len).find(|&i| a(i) != b(i))
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// 原生内存缓冲。
#[derive(Clone, Debug)]
pub struct MemorySegmentBuf {
    segment: MemorySegment,
}

impl MemorySegmentBuf {
    pub fn of(segment: MemorySegment) -> Self {
        Self { segment }
    }

    pub fn segment(&self) -> &MemorySegment {
        &self.segment
    }

    pub fn into_segment(self) -> MemorySegment {
        self.segment
    }
}

impl From<MemorySegment> for MemorySegmentBuf {
    fn from(segment: MemorySegment) -> Self {
        Self::of(segment)
    }
}

impl Sealed for MemorySegmentBuf {
    fn backing(&self) -> BackingRef<'_> {
        BackingRef::Native(self)
    }
}

impl Buf for MemorySegmentBuf {
    fn size(&self) -> usize {
        self.segment.size()
    }

    fn is_mutable(&self) -> bool {
        !self.segment.is_read_only()
    }

    fn get_byte(&self, index: usize) -> Result<u8> {
        self.segment.get_byte(index)
    }

    fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        self.segment.set_byte(index, value)
    }

    fn read_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.segment.copy_to(index, dst)
    }

    fn write_bytes(&self, index: usize, src: &[u8]) -> Result<()> {
        self.segment.copy_from(index, src)
    }

    fn get_short(&self, index: usize) -> Result<i16> {
        self.segment.read_array(index).map(i16::from_be_bytes)
    }

    fn get_int(&self, index: usize) -> Result<i32> {
        self.segment.read_array(index).map(i32::from_be_bytes)
    }

    fn get_int_le(&self, index: usize) -> Result<i32> {
        self.segment.read_array(index).map(i32::from_le_bytes)
    }

    fn get_long(&self, index: usize) -> Result<i64> {
        self.segment.read_array(index).map(i64::from_be_bytes)
    }

    fn set_short(&self, index: usize, value: i16) -> Result<()> {
        self.segment.write_array(index, value.to_be_bytes())
    }

    fn set_int(&self, index: usize, value: i32) -> Result<()> {
        self.segment.write_array(index, value.to_be_bytes())
    }

    fn set_int_le(&self, index: usize, value: i32) -> Result<()> {
        self.segment.write_array(index, value.to_le_bytes())
    }

    fn set_long(&self, index: usize, value: i64) -> Result<()> {
        self.segment.write_array(index, value.to_be_bytes())
    }

    fn to_byte_array(&self) -> Vec<u8> {
        self.segment.to_vec()
    }

    fn sub_list(&self, from: usize, to: usize) -> Result<Self> {
        check_bounds("MemorySegmentBuf::sub_list", from, to, self.size())?;
        if from == 0 && to == self.size() {
            return Ok(self.clone());
        }
        self.sub_list_forced(from, to)
    }

    fn sub_list_forced(&self, from: usize, to: usize) -> Result<Self> {
        check_bounds("MemorySegmentBuf::sub_list_forced", from, to, self.size())?;
        Ok(Self::of(self.segment.as_slice(from, to - from)?))
    }

    /// 原生存储不支持冻结：可变性只由区域的只读属性决定。
    fn freeze(&self) {}

    fn as_array_strict(&self) -> Option<BufBytes<'_>> {
        None
    }

    fn as_unbounded_array_strict(&self) -> Option<BufBytes<'_>> {
        None
    }

    fn binary_input_stream(&self) -> SafeByteArrayInputStream {
        SafeByteArrayInputStream::new(self.copy())
    }

    fn binary_output_stream(&self, from: usize, to: usize) -> Result<SafeByteArrayOutputStream> {
        let view = self.sub_list_forced(from, to)?;
        if self.segment.is_read_only() {
            return Err(DataError::unsupported(
                "MemorySegmentBuf::binary_output_stream",
                "native segment is read-only",
            ));
        }
        Ok(SafeByteArrayOutputStream::over_native(view))
    }
}

impl PartialEq for MemorySegmentBuf {
    fn eq(&self, other: &Self) -> bool {
        self.segment.mismatch(&other.segment).is_none()
    }
}

impl Eq for MemorySegmentBuf {}

impl PartialOrd for MemorySegmentBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemorySegmentBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

impl hash::Hash for MemorySegmentBuf {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.to_byte_array().hash(state);
    }
}

impl From<MemorySegmentBuf> for ByteListBuf {
    fn from(buf: MemorySegmentBuf) -> Self {
        buf.copy()
    }
}
