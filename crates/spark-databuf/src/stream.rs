//! 可重定位的字节流原语：`Buf` 之下的 I/O 基底。
//!
//! # 设计背景（Why）
//! - 编解码层需要“带游标、可回退”的字节流，而标准库的 `io::Read`/`io::Write` 既不暴露绝对位置，
//!   也把所有失败都包装成 `io::Error`；
//! - 这里的流只在真正越界时失败，并以 [`DataError`] 精确报告，不做任何隐式 flush 或同步。
//!
//! # 契约说明（What）
//! - [`SafeByteArrayInputStream`]：固定窗口上的读游标，读到末尾返回 `None`/`0` 而非错误；
//! - [`SafeByteArrayOutputStream`]：写出目标可以是自有可增长数组，也可以是堆缓冲或原生内存上的定长窗口；
//!   窗口目标容量固定，越过容量的写入在修改任何字节前返回 `OutOfRange`；
//! - `size()` 为已写入的最高水位，`position()` 为当前游标，二者在回填长度前缀时会暂时分离。

use crate::{
    buf::{AnyBuf, Buf},
    encoder::{ByteSink, ByteSource},
    error::{DataError, Result, check_bounds, check_range},
    heap::ByteListBuf,
    native::MemorySegmentBuf,
};

/// 堆缓冲上的读游标。
///
/// 构造自 [`Buf::binary_input_stream`] 时直接别名堆存储，读取不复制整段数据。
#[derive(Clone, Debug)]
pub struct SafeByteArrayInputStream {
    buf: ByteListBuf,
    position: usize,
    mark: usize,
}

impl SafeByteArrayInputStream {
    pub fn new(buf: ByteListBuf) -> Self {
        Self {
            buf,
            position: 0,
            mark: 0,
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::new(ByteListBuf::wrap(bytes))
    }

    /// 流的总长度。
    pub fn len(&self) -> usize {
        self.buf.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// 绝对定位；允许定位到末尾，不允许越过末尾。
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        check_bounds("SafeByteArrayInputStream::set_position", 0, position, self.len())?;
        self.position = position;
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.len() - self.position
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let value = self.buf.get_byte(self.position).ok()?;
        self.position += 1;
        Some(value)
    }

    /// 尽量填满 `dst`，返回实际读取的字节数；已到末尾返回 `0`。
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.available());
        if n == 0 {
            return 0;
        }
        match self.buf.read_bytes(self.position, &mut dst[..n]) {
            Ok(()) => {
                self.position += n;
                n
            }
            Err(_) => 0,
        }
    }

    /// 精确读取 `dst.len()` 字节，不足时不移动游标并返回 `OutOfRange`。
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        check_range(
            "SafeByteArrayInputStream::read_exact",
            self.position,
            dst.len(),
            self.len(),
        )?;
        self.buf.read_bytes(self.position, dst)?;
        self.position += dst.len();
        Ok(())
    }

    /// 跳过至多 `n` 字节，返回实际跳过数。
    pub fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.available());
        self.position += skipped;
        skipped
    }

    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    pub fn reset(&mut self) {
        self.position = self.mark;
    }

    /// 底层缓冲（定长窗口视图）。
    pub fn buf(&self) -> &ByteListBuf {
        &self.buf
    }
}

impl ByteSource for SafeByteArrayInputStream {
    fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        self.read(dst)
    }
}

#[derive(Debug)]
enum Target {
    /// `len() == count` 恒成立。
    Growable(Vec<u8>),
    Heap(ByteListBuf),
    Native(MemorySegmentBuf),
}

/// 带游标的字节写出流。
#[derive(Debug)]
pub struct SafeByteArrayOutputStream {
    target: Target,
    position: usize,
    count: usize,
}

impl SafeByteArrayOutputStream {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_target(Target::Growable(Vec::with_capacity(capacity)))
    }

    fn from_target(target: Target) -> Self {
        Self {
            target,
            position: 0,
            count: 0,
        }
    }

    /// 覆盖堆缓冲窗口的定长写出流；调用方已校验可变性。
    pub(crate) fn over_heap(view: ByteListBuf) -> Self {
        Self::from_target(Target::Heap(view))
    }

    /// 覆盖原生内存窗口的定长写出流；调用方已校验非只读。
    pub(crate) fn over_native(view: MemorySegmentBuf) -> Self {
        Self::from_target(Target::Native(view))
    }

    /// 定长目标的容量；可增长目标返回 `None`。
    pub fn capacity_limit(&self) -> Option<usize> {
        match &self.target {
            Target::Growable(_) => None,
            Target::Heap(view) => Some(view.size()),
            Target::Native(view) => Some(view.size()),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// 已写入的最高水位。
    pub fn size(&self) -> usize {
        self.count
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    /// 在当前游标处写入 `bytes` 并前移游标。
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let position = self.position;
        let end = position.checked_add(bytes.len()).ok_or_else(|| {
            DataError::out_of_range("SafeByteArrayOutputStream::write", position, bytes.len(), usize::MAX)
        })?;
        match &mut self.target {
            Target::Growable(vec) => {
                if position == vec.len() {
                    vec.extend_from_slice(bytes);
                } else {
                    if end > vec.len() {
                        vec.resize(end, 0);
                    }
                    vec[position..end].copy_from_slice(bytes);
                }
            }
            Target::Heap(view) => view.write_bytes(position, bytes)?,
            Target::Native(view) => view.write_bytes(position, bytes)?,
        }
        self.position = end;
        self.count = self.count.max(end);
        Ok(())
    }

    /// 游标移动到 `position`，不改变已写内容；只能定位到已写区域之内。
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        check_bounds("SafeByteArrayOutputStream::set_position", 0, position, self.count)?;
        self.position = position;
        Ok(())
    }

    /// 回退 `n` 字节并丢弃游标之后的内容。
    pub fn rewind(&mut self, n: usize) -> Result<()> {
        let position = self.position.checked_sub(n).ok_or_else(|| DataError::OutOfRange {
            op: "SafeByteArrayOutputStream::rewind",
            detail: format!("cannot rewind {n} bytes from position {}", self.position),
        })?;
        self.position = position;
        self.count = position;
        if let Target::Growable(vec) = &mut self.target {
            vec.truncate(position);
        }
        Ok(())
    }

    /// 前移 `n` 字节；越过已写区域的部分以零填充。
    pub fn advance(&mut self, n: usize) -> Result<()> {
        let target = self.position.checked_add(n).ok_or_else(|| {
            DataError::out_of_range("SafeByteArrayOutputStream::advance", self.position, n, usize::MAX)
        })?;
        if target <= self.count {
            self.position = target;
            return Ok(());
        }
        if let Some(limit) = self.capacity_limit() {
            check_range("SafeByteArrayOutputStream::advance", self.position, n, limit)?;
        }
        self.position = self.count;
        let zeroes = vec![0u8; target - self.count];
        self.write(&zeroes)
    }

    /// 已写内容的副本。
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.target {
            Target::Growable(vec) => vec.clone(),
            Target::Heap(view) => view.with_window(|bytes| bytes[..self.count].to_vec()),
            Target::Native(view) => view.segment().prefix_to_vec(self.count),
        }
    }

    /// 已写内容的缓冲：可增长目标零拷贝移交，窗口目标返回 `[0, size)` 子视图。
    pub fn into_buf(self) -> Result<AnyBuf> {
        let count = self.count;
        Ok(match self.target {
            Target::Growable(vec) => AnyBuf::Heap(ByteListBuf::wrap(vec)),
            Target::Heap(view) => AnyBuf::Heap(view.sub_list(0, count)?),
            Target::Native(view) => AnyBuf::Native(view.sub_list(0, count)?),
        })
    }

    /// 清空内容与游标；窗口目标的字节保持原样，仅重置水位。
    pub fn reset(&mut self) {
        self.position = 0;
        self.count = 0;
        if let Target::Growable(vec) = &mut self.target {
            vec.clear();
        }
    }
}

impl Default for SafeByteArrayOutputStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSink for SafeByteArrayOutputStream {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write(bytes)
    }
}
