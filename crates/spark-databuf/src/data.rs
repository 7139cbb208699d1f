//! 类型化编解码流：定宽原语、长度前缀文本与可空值帧。
//!
//! # 设计背景（Why）
//! - 代码生成产物只调用本模块的读写面：`write_int`、`write_short_text`、`read_nullable` 等，
//!   不关心底层是可增长数组、限长输出还是原生内存窗口；
//! - 长度前缀文本若先编码再写出，UTF-8 路径上每个字段都会多一次临时分配，
//!   因此 [`BufDataOutput`] 采用“回填长度”模式直接把编码结果流式写入目标。
//!
//! # 逻辑解析（How）
//! - [`DataOutput`]/[`DataInput`] 以 `write`/`read_fully` 为唯一必需原语，其余操作均有大端默认实现；
//! - [`SafeDataOutputStream`]/[`SafeDataInputStream`] 是通用实现，文本一律走“先编码、后写出”；
//! - [`BufDataOutput`] 增加限长、游标控制与 UTF-8 回填；[`BufDataInput`] 只向前读，
//!   `mark`/`reset` 一律失败，需要回退时改用绝对定位 [`BufDataInput::set_position`]。
//!
//! # 契约说明（What）
//! - 短文本：`u16` 大端长度（上限 32767）+ 字节；中文本：`i32` 大端长度 + 字节；
//! - 可空值：一个布尔存在标志字节，存在时紧跟负载自身的编码；
//! - 限长输出的每次写入都先计算结果长度，超限时在修改任何状态前返回 `OutOfRange`；
//! - 多步序列（回填文本）在后续步骤失败时不回滚，调用方应丢弃已部分写入的流。

use crate::{
    buf::{AnyBuf, Buf},
    charset::Charset,
    config::DataBufConfig,
    encoder::{ByteSink, EncoderPolicy, ZeroAllocationEncoder},
    error::{DataError, Result, check_range},
    int52::{INT52_BYTES, Int52},
    stream::{SafeByteArrayInputStream, SafeByteArrayOutputStream},
};

/// 短文本可编码的最大字节数。
pub const MAX_SHORT_TEXT_BYTES: usize = i16::MAX as usize;

/// 中文本可编码的最大字节数。
pub const MAX_MEDIUM_TEXT_BYTES: usize = i32::MAX as usize;

/// 文本长度前缀的宽度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrefixWidth {
    Short,
    Medium,
}

impl PrefixWidth {
    const fn bytes(self) -> usize {
        match self {
            PrefixWidth::Short => 2,
            PrefixWidth::Medium => 4,
        }
    }

    const fn max(self) -> usize {
        match self {
            PrefixWidth::Short => MAX_SHORT_TEXT_BYTES,
            PrefixWidth::Medium => MAX_MEDIUM_TEXT_BYTES,
        }
    }

    fn check(self, len: usize) -> Result<()> {
        if len > self.max() {
            return Err(DataError::invalid_argument(format!(
                "text of {len} bytes exceeds the {}-byte prefix maximum {}",
                self.bytes(),
                self.max()
            )));
        }
        Ok(())
    }

    /// 写出已校验过的长度。
    fn write_len<O: DataOutput + ?Sized>(self, out: &mut O, len: usize) -> Result<()> {
        self.check(len)?;
        match self {
            PrefixWidth::Short => out.write(&(len as u16).to_be_bytes()),
            PrefixWidth::Medium => out.write(&(len as u32).to_be_bytes()),
        }
    }
}

/// 先整体编码再写出的文本路径；字节数在写出前已知，无需回填。
fn write_pre_encoded<O: DataOutput + ?Sized>(
    out: &mut O,
    text: &str,
    charset: Charset,
    width: PrefixWidth,
) -> Result<()> {
    let bytes = charset.encode(text, EncoderPolicy::Strict)?;
    width.check(bytes.len())?;
    out.ensure_writable(width.bytes() + bytes.len())?;
    width.write_len(out, bytes.len())?;
    out.write(&bytes)
}

/// 类型化写出面。
///
/// 只有 [`DataOutput::write`] 与 [`DataOutput::written`] 必须实现；多字节原语均为大端。
pub trait DataOutput {
    /// 写出原始字节。
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// 当前游标处已写出的字节数。
    fn written(&self) -> usize;

    /// 预检接下来 `additional` 字节能否写入，不能时不修改任何状态。
    fn ensure_writable(&mut self, additional: usize) -> Result<()> {
        let _ = additional;
        Ok(())
    }

    fn write_range(&mut self, bytes: &[u8], offset: usize, len: usize) -> Result<()> {
        check_range("DataOutput::write_range", offset, len, bytes.len())?;
        self.write(&bytes[offset..offset + len])
    }

    fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.write_byte(u8::from(value))
    }

    fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    fn write_short(&mut self, value: i16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    fn write_char(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    fn write_float(&mut self, value: f32) -> Result<()> {
        self.write(&value.to_bits().to_be_bytes())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.write(&value.to_bits().to_be_bytes())
    }

    fn write_int52(&mut self, value: Int52) -> Result<()> {
        self.write(&value.serialize())
    }

    /// `u16` 长度前缀文本。
    fn write_short_text(&mut self, text: &str, charset: Charset) -> Result<()> {
        write_pre_encoded(self, text, charset, PrefixWidth::Short)
    }

    /// `i32` 长度前缀文本。
    fn write_medium_text(&mut self, text: &str, charset: Charset) -> Result<()> {
        write_pre_encoded(self, text, charset, PrefixWidth::Medium)
    }

    /// 可空值帧：存在标志字节，随后是 `write` 写出的负载。
    fn write_nullable<T>(
        &mut self,
        value: Option<T>,
        write: impl FnOnce(&mut Self, T) -> Result<()>,
    ) -> Result<()>
    where
        Self: Sized,
    {
        self.write_boolean(value.is_some())?;
        match value {
            Some(value) => write(self, value),
            None => Ok(()),
        }
    }
}

/// 类型化读取面。
pub trait DataInput {
    /// 精确填满 `dst`；数据不足时返回 `OutOfRange` 且不消耗任何字节。
    fn read_fully(&mut self, dst: &mut [u8]) -> Result<()>;

    /// 剩余可读字节数。
    fn available(&self) -> usize;

    /// 跳过至多 `n` 字节，返回实际跳过数。
    fn skip_bytes(&mut self, n: usize) -> usize;

    fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let [value] = read_array::<Self, 1>(self)?;
        Ok(value)
    }

    fn read_short(&mut self) -> Result<i16> {
        read_array(self).map(i16::from_be_bytes)
    }

    fn read_unsigned_short(&mut self) -> Result<u16> {
        read_array(self).map(u16::from_be_bytes)
    }

    fn read_char(&mut self) -> Result<u16> {
        self.read_unsigned_short()
    }

    fn read_int(&mut self) -> Result<i32> {
        read_array(self).map(i32::from_be_bytes)
    }

    fn read_long(&mut self) -> Result<i64> {
        read_array(self).map(i64::from_be_bytes)
    }

    fn read_float(&mut self) -> Result<f32> {
        read_array(self).map(|bytes| f32::from_bits(u32::from_be_bytes(bytes)))
    }

    fn read_double(&mut self) -> Result<f64> {
        read_array(self).map(|bytes| f64::from_bits(u64::from_be_bytes(bytes)))
    }

    fn read_int52(&mut self) -> Result<Int52> {
        read_array::<Self, INT52_BYTES>(self).map(|bytes| Int52::deserialize(&bytes))
    }

    /// 读取 `len` 字节并按严格策略解码。
    fn read_text(&mut self, len: usize, charset: Charset) -> Result<String> {
        if len > self.available() {
            return Err(DataError::out_of_range("DataInput::read_text", 0, len, self.available()));
        }
        let mut bytes = vec![0u8; len];
        self.read_fully(&mut bytes)?;
        charset.decode(&bytes, EncoderPolicy::Strict)
    }

    fn read_short_text(&mut self, charset: Charset) -> Result<String> {
        let len = usize::from(self.read_unsigned_short()?);
        self.read_text(len, charset)
    }

    fn read_medium_text(&mut self, charset: Charset) -> Result<String> {
        let len = self.read_int()?;
        let len = usize::try_from(len)
            .map_err(|_| DataError::invalid_argument(format!("negative medium text length {len}")))?;
        self.read_text(len, charset)
    }

    /// 可空值帧的读取端。
    fn read_nullable<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>>
    where
        Self: Sized,
    {
        if self.read_boolean()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    fn mark(&mut self) -> Result<()> {
        Err(DataError::unsupported("DataInput::mark", "input is forward-only"))
    }

    fn reset(&mut self) -> Result<()> {
        Err(DataError::unsupported("DataInput::reset", "input is forward-only"))
    }
}

#[inline]
fn read_array<I: DataInput + ?Sized, const N: usize>(input: &mut I) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    input.read_fully(&mut out)?;
    Ok(out)
}

/// 基于 [`SafeByteArrayOutputStream`] 的通用写出流。
#[derive(Debug, Default)]
pub struct SafeDataOutputStream {
    out: SafeByteArrayOutputStream,
}

impl SafeDataOutputStream {
    pub fn new(out: SafeByteArrayOutputStream) -> Self {
        Self { out }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(SafeByteArrayOutputStream::with_capacity(capacity))
    }

    pub fn get_ref(&self) -> &SafeByteArrayOutputStream {
        &self.out
    }

    pub fn into_inner(self) -> SafeByteArrayOutputStream {
        self.out
    }

    /// 已写入的最高水位。
    pub fn size(&self) -> usize {
        self.out.size()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.out.to_vec()
    }

    /// 把游标移到已写区域内的 `position`，`written` 随之变化。
    pub(crate) fn seek(&mut self, position: usize) -> Result<()> {
        self.out.set_position(position)
    }

    pub(crate) fn rewind(&mut self, n: usize) -> Result<()> {
        self.out.rewind(n)
    }

    pub(crate) fn advance(&mut self, n: usize) -> Result<()> {
        self.out.advance(n)
    }
}

impl DataOutput for SafeDataOutputStream {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write(bytes)
    }

    fn written(&self) -> usize {
        self.out.position()
    }
}

/// 基于 [`SafeByteArrayInputStream`] 的通用读取流，支持 `mark`/`reset`。
#[derive(Clone, Debug)]
pub struct SafeDataInputStream {
    input: SafeByteArrayInputStream,
}

impl SafeDataInputStream {
    pub fn new(input: SafeByteArrayInputStream) -> Self {
        Self { input }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::new(SafeByteArrayInputStream::from_vec(bytes))
    }

    pub fn get_ref(&self) -> &SafeByteArrayInputStream {
        &self.input
    }

    pub fn get_mut(&mut self) -> &mut SafeByteArrayInputStream {
        &mut self.input
    }

    pub fn into_inner(self) -> SafeByteArrayInputStream {
        self.input
    }
}

impl DataInput for SafeDataInputStream {
    fn read_fully(&mut self, dst: &mut [u8]) -> Result<()> {
        self.input.read_exact(dst)
    }

    fn available(&self) -> usize {
        self.input.available()
    }

    fn skip_bytes(&mut self, n: usize) -> usize {
        self.input.skip(n)
    }

    fn mark(&mut self) -> Result<()> {
        self.input.mark();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.input.reset();
        Ok(())
    }
}

/// 面向 [`Buf`] 的写出流：可增长、限长或覆盖已有缓冲窗口。
///
/// # 教案式说明
/// - **意图 (Why)**：生成的序列化代码在一次编码会话中顺序写入字段，结束后取走完成的缓冲；
/// - **契约 (What)**：
///   - `limit` 存在时，每次写入先校验 `position + len <= limit`，失败不改变状态；
///   - `written()` 始终等于 `position()`；
///   - UTF-8 文本采用回填长度前缀，其余字符集先编码再写出；
/// - **风险 (Trade-offs)**：回填期间游标暂时位于已写区域中部，若此时编码失败，
///   前缀保持为零且负载部分写入，调用方须丢弃该输出。
#[derive(Debug)]
pub struct BufDataOutput {
    stream: SafeDataOutputStream,
    limit: Option<usize>,
    /// UTF-8 回填路径使用的宽松转码器。
    encoder: ZeroAllocationEncoder,
}

impl BufDataOutput {
    /// 无上限的可增长输出。
    pub fn create() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_parts(SafeByteArrayOutputStream::with_capacity(capacity), None)
    }

    /// 最多写入 `limit` 字节的输出。
    pub fn create_limited(limit: usize) -> Self {
        Self::create_limited_with_capacity(limit, limit.min(64))
    }

    pub fn create_limited_with_capacity(limit: usize, capacity: usize) -> Self {
        Self::from_parts(
            SafeByteArrayOutputStream::with_capacity(capacity.min(limit)),
            Some(limit),
        )
    }

    pub fn from_config(config: &DataBufConfig) -> Result<Self> {
        config.validate()?;
        let mut out = match config.output_limit {
            Some(limit) => Self::create_limited_with_capacity(limit, config.output_initial_capacity),
            None => Self::with_capacity(config.output_initial_capacity),
        };
        out.encoder = config.encoder(EncoderPolicy::Lenient);
        Ok(out)
    }

    /// 覆盖 `buf[from, to)` 的定长输出，写入直接落在 `buf` 的存储上。
    pub fn over<B: Buf + ?Sized>(buf: &B, from: usize, to: usize) -> Result<Self> {
        let stream = buf.binary_output_stream(from, to)?;
        let limit = stream.capacity_limit();
        Ok(Self::from_parts(stream, limit))
    }

    fn from_parts(out: SafeByteArrayOutputStream, limit: Option<usize>) -> Self {
        Self {
            stream: SafeDataOutputStream::new(out),
            limit,
            encoder: ZeroAllocationEncoder::LENIENT,
        }
    }

    pub fn position(&self) -> usize {
        self.stream.written()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// 已写入的最高水位。
    pub fn size(&self) -> usize {
        self.stream.size()
    }

    /// 回退 `n` 字节并丢弃其后的内容；越过起点时失败。
    pub fn rewind_position(&mut self, n: usize) -> Result<()> {
        self.stream.rewind(n)
    }

    /// 前移 `n` 字节，新增部分以零填充，受 `limit` 约束。
    pub fn advance_position(&mut self, n: usize) -> Result<()> {
        self.ensure_writable(n)?;
        self.stream.advance(n)
    }

    pub fn to_byte_array(&self) -> Vec<u8> {
        self.stream.to_vec()
    }

    /// 取走已写内容。
    pub fn into_buf(self) -> Result<AnyBuf> {
        self.stream.into_inner().into_buf()
    }

    fn write_utf8_backpatched(&mut self, text: &str, width: PrefixWidth) -> Result<()> {
        width.check(text.len())?;
        self.ensure_writable(width.bytes() + text.len())?;
        let prefix_at = self.position();
        width.write_len(self, 0)?;
        let start = self.position();
        let encoder = self.encoder;
        encoder.encode_to(text, self)?;
        let end = self.position();
        self.stream.seek(prefix_at)?;
        width.write_len(self, end - start)?;
        self.stream.seek(end)
    }
}

impl Default for BufDataOutput {
    fn default() -> Self {
        Self::create()
    }
}

impl DataOutput for BufDataOutput {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable(bytes.len())?;
        self.stream.write(bytes)
    }

    fn written(&self) -> usize {
        self.position()
    }

    fn ensure_writable(&mut self, additional: usize) -> Result<()> {
        match self.limit {
            Some(limit) => check_range("BufDataOutput::write", self.position(), additional, limit),
            None => Ok(()),
        }
    }

    fn write_short_text(&mut self, text: &str, charset: Charset) -> Result<()> {
        if charset.is_utf8() {
            return self.write_utf8_backpatched(text, PrefixWidth::Short);
        }
        write_pre_encoded(self, text, charset, PrefixWidth::Short)
    }

    fn write_medium_text(&mut self, text: &str, charset: Charset) -> Result<()> {
        if charset.is_utf8() {
            return self.write_utf8_backpatched(text, PrefixWidth::Medium);
        }
        write_pre_encoded(self, text, charset, PrefixWidth::Medium)
    }
}

impl ByteSink for BufDataOutput {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write(bytes)
    }
}

/// 面向 [`Buf`] 的只进读取流。
#[derive(Clone, Debug)]
pub struct BufDataInput {
    input: SafeByteArrayInputStream,
}

impl BufDataInput {
    /// 读取 `buf` 的全部内容；堆存储零拷贝，原生存储先物化。
    pub fn new<B: Buf + ?Sized>(buf: &B) -> Self {
        Self {
            input: buf.binary_input_stream(),
        }
    }

    pub fn position(&self) -> usize {
        self.input.position()
    }

    /// 绝对定位，可用于回退。
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        self.input.set_position(position)
    }

    pub fn remaining(&self) -> usize {
        self.input.available()
    }
}

impl DataInput for BufDataInput {
    fn read_fully(&mut self, dst: &mut [u8]) -> Result<()> {
        self.input.read_exact(dst)
    }

    fn available(&self) -> usize {
        self.input.available()
    }

    fn skip_bytes(&mut self, n: usize) -> usize {
        self.input.skip(n)
    }

    fn read_text(&mut self, len: usize, charset: Charset) -> Result<String> {
        if len > self.available() {
            return Err(DataError::out_of_range(
                "BufDataInput::read_text",
                self.position(),
                len,
                self.input.len(),
            ));
        }
        if charset.is_utf8() {
            return ZeroAllocationEncoder::STRICT.decode_from(&mut self.input, len);
        }
        let mut bytes = vec![0u8; len];
        self.read_fully(&mut bytes)?;
        charset.decode(&bytes, EncoderPolicy::Strict)
    }
}
