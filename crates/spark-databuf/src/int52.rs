//! 52 位无符号整数及其 7 字节定长线格式。
//!
//! # 设计背景（Why）
//! - Schema 中的计数器、时间戳等字段需要超过 32 位的范围，但又要与只能精确表示 53 位整数的
//!   对端（例如双精度浮点）无损互通，因此取 `[0, 2^52 - 1]` 作为定义域；
//! - 线格式固定为 7 字节大端，第 0 字节只有低 4 位承载第 48 至 51 位，高 4 位恒为零。
//!
//! # 契约说明（What）
//! - 构造时校验定义域，越界返回 [`DataError::InvalidArgument`]；
//! - `0/1/2/10` 对应共享常量 [`Int52::ZERO`]、[`Int52::ONE`]、[`Int52::TWO`]、[`Int52::TEN`]；
//! - 排序为无符号比较。

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// `Int52` 的线格式字节数。
pub const INT52_BYTES: usize = 7;

/// 52 位无符号整数值。
///
/// 值语义类型：`Copy` 且不可变，规范值以关联常量形式共享，其余值按需构造。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Int52(u64);

impl Int52 {
    /// 定义域上界 `2^52 - 1`。
    pub const MAX_VALUE: u64 = 0x000F_FFFF_FFFF_FFFF;
    pub const MIN_VALUE: u64 = 0;

    pub const ZERO: Int52 = Int52(0);
    pub const ONE: Int52 = Int52(1);
    pub const TWO: Int52 = Int52(2);
    pub const TEN: Int52 = Int52(10);

    /// 由有符号整数构造，负数与超过 [`Int52::MAX_VALUE`] 的值均被拒绝。
    pub fn from_long(value: i64) -> Result<Int52> {
        if value < 0 {
            return Err(DataError::invalid_argument(format!(
                "Int52 must be non-negative, got {value}"
            )));
        }
        Int52::from_u64(value as u64)
    }

    /// 由无符号整数构造。
    pub fn from_u64(value: u64) -> Result<Int52> {
        if value > Self::MAX_VALUE {
            return Err(DataError::invalid_argument(format!(
                "Int52 out of range: {value} > {}",
                Self::MAX_VALUE
            )));
        }
        Ok(Self::canonical(value))
    }

    /// 规范值命中共享常量，其余直接包裹。
    #[inline]
    fn canonical(value: u64) -> Int52 {
        match value {
            0 => Self::ZERO,
            1 => Self::ONE,
            2 => Self::TWO,
            10 => Self::TEN,
            other => Int52(other),
        }
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// 编码为 7 字节大端表示。
    pub fn serialize(self) -> [u8; INT52_BYTES] {
        let be = self.0.to_be_bytes();
        let mut out = [0u8; INT52_BYTES];
        out.copy_from_slice(&be[1..]);
        out[0] &= 0x0F;
        out
    }

    /// 从 7 字节大端表示解码；第 0 字节高 4 位被屏蔽，因此结果总在定义域内。
    pub fn deserialize(bytes: &[u8; INT52_BYTES]) -> Int52 {
        let mut be = [0u8; 8];
        be[1..].copy_from_slice(bytes);
        be[1] &= 0x0F;
        Self::canonical(u64::from_be_bytes(be))
    }

    /// 从任意切片起始处解码，切片不足 7 字节时返回越界错误。
    pub fn deserialize_slice(bytes: &[u8]) -> Result<Int52> {
        let head: &[u8; INT52_BYTES] = bytes
            .get(..INT52_BYTES)
            .and_then(|head| head.try_into().ok())
            .ok_or_else(|| DataError::out_of_range("Int52::deserialize", 0, INT52_BYTES, bytes.len()))?;
        Ok(Self::deserialize(head))
    }
}

impl TryFrom<i64> for Int52 {
    type Error = DataError;

    fn try_from(value: i64) -> Result<Self> {
        Int52::from_long(value)
    }
}

impl TryFrom<u64> for Int52 {
    type Error = DataError;

    fn try_from(value: u64) -> Result<Self> {
        Int52::from_u64(value)
    }
}

impl From<Int52> for u64 {
    fn from(value: Int52) -> Self {
        value.0
    }
}

impl From<Int52> for i64 {
    fn from(value: Int52) -> Self {
        value.as_i64()
    }
}

impl From<u32> for Int52 {
    fn from(value: u32) -> Self {
        Int52::canonical(u64::from(value))
    }
}

impl fmt::Display for Int52 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
