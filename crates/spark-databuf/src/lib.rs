//! `spark-databuf` 提供 schema 驱动序列化所需的运行时基底：字节缓冲、类型化编解码流、
//! 零分配 UTF-8 转码器与 52 位整数。
//!
//! # 模块定位（Why）
//! - 代码生成产物只面向 [`Buf`] 的工厂/访问器与 [`BufDataInput`]/[`BufDataOutput`] 的读写面编程，
//!   无需知道底层是堆数组还是原生内存；
//! - 视图零拷贝、冻结跨视图传播、长度前缀回填等不变式集中在本 crate 内实现与测试，
//!   上层生成代码保持机械、简单。
//!
//! # 设计概要（How）
//! - `buf`：统一缓冲契约与存储无关的 [`AnyBuf`]；`heap`/`native` 分别提供堆与原生内存实现；
//! - `stream`：可重定位、只在越界时失败的字节流，作为 `Buf` 之下的 I/O 基底；
//! - `data`：定宽原语、长度前缀文本与可空值帧的编解码；
//! - `encoder`/`charset`：宽松与严格两种策略共享同一转码实现；
//! - `int52`/`comparator`：定宽 52 位整数与“先比长度”的字节序比较规则；
//! - `config`/`error`：可调参数与统一错误域。
//!
//! # 并发约定（Concurrency）
//! - 所有公开缓冲类型均满足 `Send + Sync`：冻结后的堆缓冲可任意并发读取；
//!   堆存储的写入由读写锁串行化，原生存储逐字节原子访问，多字节值的整体一致性由调用方保证；
//! - 编解码流是单线程、短生命周期对象；转码器草稿区按线程隔离。

mod buf;
mod charset;
mod comparator;
mod config;
mod data;
mod encoder;
mod error;
mod heap;
mod int52;
mod native;
mod stream;

pub use buf::{AnyBuf, Buf, BufBytes, DEFAULT_WRITE_CHUNK_SIZE};
pub use charset::Charset;
pub use comparator::VariableLengthLexicographicComparator;
pub use config::DataBufConfig;
pub use data::{
    BufDataInput, BufDataOutput, DataInput, DataOutput, MAX_MEDIUM_TEXT_BYTES,
    MAX_SHORT_TEXT_BYTES, SafeDataInputStream, SafeDataOutputStream,
};
pub use encoder::{
    ByteSink, ByteSource, DEFAULT_SCRATCH_SIZE, EncoderPolicy, ZeroAllocationEncoder,
    thread_decode_capacity,
};
pub use error::{DataError, Result, codes};
pub use heap::{ByteListBuf, HeapArrayGuard};
pub use int52::{INT52_BYTES, Int52};
pub use native::{MemorySegment, MemorySegmentBuf, NativeArena};
pub use stream::{SafeByteArrayInputStream, SafeByteArrayOutputStream};
