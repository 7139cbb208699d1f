//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为缓冲、编解码流与文本转码提供统一的错误语义，调用方只需匹配一个枚举；
//! - 每个变体对应一个稳定错误码，便于上层（代码生成产物、业务序列化）做精确分支与告警。
//!
//! ## 设计要求（What）
//! - 所有失败均同步返回给直接调用方，本 crate 内部既不重试也不记录日志；
//! - 单个原语操作要么整体失败且不修改任何字节，要么整体成功；
//! - 原生内存生命周期违例（Arena 先于视图释放）属于调用方契约，无法在运行时检测，因此没有对应变体。

use std::io;

use thiserror::Error;

/// 本 crate 统一使用的 `Result` 别名。
pub type Result<T, E = DataError> = core::result::Result<T, E>;

/// 稳定错误码常量，供日志检索与跨语言对齐使用。
pub mod codes {
    pub const OUT_OF_RANGE: &str = "databuf.out_of_range";
    pub const IMMUTABLE_VIOLATION: &str = "databuf.immutable_violation";
    pub const INVALID_ARGUMENT: &str = "databuf.invalid_argument";
    pub const ENCODING_FAILURE: &str = "databuf.encoding_failure";
    pub const UNSUPPORTED_OPERATION: &str = "databuf.unsupported_operation";
    pub const IO: &str = "databuf.io";
}

/// 数据缓冲错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把越界、只读写入、参数非法、字符集失败、不支持的操作这五类失败显式区分，
///   调用方可以据此决定丢弃部分写入的流还是改走其它路径。
/// - **契约 (What)**：
///   - 变体均为 `Send + Sync + 'static`，可跨线程传播；
///   - [`DataError::code`] 返回与 [`codes`] 对齐的稳定字符串；
///   - `OutOfRange` 一定在任何字节写入之前产生。
/// - **设计权衡 (Trade-offs)**：`detail` 使用 `String` 保存上下文，失败路径上多一次分配，换取可读的排障信息。
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DataError {
    /// 下标或长度越过缓冲边界，或写入超过限定容量。
    #[error("{op}: {detail}")]
    OutOfRange { op: &'static str, detail: String },

    /// 在已冻结或只读的缓冲上尝试写入。
    #[error("{op}: buffer is immutable")]
    ImmutableViolation { op: &'static str },

    /// 参数不在定义域内，例如 Int52 超界、文本长度超出前缀宽度。
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// 严格模式下遇到无法编码或解码的字符。
    #[error("{charset} encoding failure: {detail}")]
    EncodingFailure {
        charset: &'static str,
        detail: String,
    },

    /// 当前实现不支持该操作。
    #[error("{op} is not supported: {reason}")]
    UnsupportedOperation {
        op: &'static str,
        reason: &'static str,
    },

    /// `write_to` 目标写入失败。
    #[error("sink failure ({kind:?}): {detail}")]
    Io { kind: io::ErrorKind, detail: String },
}

impl DataError {
    /// 构造标准越界错误：`[index, index + len)` 不在 `[0, size)` 之内。
    pub fn out_of_range(op: &'static str, index: usize, len: usize, size: usize) -> Self {
        DataError::OutOfRange {
            op,
            detail: format!("range [{index}, {index}+{len}) exceeds size {size}"),
        }
    }

    pub fn immutable(op: &'static str) -> Self {
        DataError::ImmutableViolation { op }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        DataError::InvalidArgument {
            detail: detail.into(),
        }
    }

    pub fn encoding(charset: &'static str, detail: impl Into<String>) -> Self {
        DataError::EncodingFailure {
            charset,
            detail: detail.into(),
        }
    }

    pub fn unsupported(op: &'static str, reason: &'static str) -> Self {
        DataError::UnsupportedOperation { op, reason }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DataError::OutOfRange { .. } => codes::OUT_OF_RANGE,
            DataError::ImmutableViolation { .. } => codes::IMMUTABLE_VIOLATION,
            DataError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            DataError::EncodingFailure { .. } => codes::ENCODING_FAILURE,
            DataError::UnsupportedOperation { .. } => codes::UNSUPPORTED_OPERATION,
            DataError::Io { .. } => codes::IO,
        }
    }
}

impl From<io::Error> for DataError {
    fn from(err: io::Error) -> Self {
        DataError::Io {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// 校验 `[index, index + width)` 落在 `[0, size)` 之内，溢出同样视为越界。
#[inline]
pub(crate) fn check_range(op: &'static str, index: usize, width: usize, size: usize) -> Result<()> {
    match index.checked_add(width) {
        Some(end) if end <= size => Ok(()),
        _ => Err(DataError::out_of_range(op, index, width, size)),
    }
}

/// 校验半开区间 `[from, to)` 合法且不超过 `size`。
#[inline]
pub(crate) fn check_bounds(op: &'static str, from: usize, to: usize, size: usize) -> Result<()> {
    if from > to || to > size {
        return Err(DataError::OutOfRange {
            op,
            detail: format!("bounds [{from}, {to}) invalid for size {size}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_range_rejects_overflowing_width() {
        assert!(check_range("t", usize::MAX, 2, 10).is_err());
        assert!(check_range("t", 8, 2, 10).is_ok());
        assert!(check_range("t", 9, 2, 10).is_err());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(DataError::immutable("set").code(), "databuf.immutable_violation");
        let io_err: DataError = io::Error::new(io::ErrorKind::WriteZero, "full").into();
        assert_eq!(io_err.code(), codes::IO);
    }
}
