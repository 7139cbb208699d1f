//! 变长字典序：先比长度，长度相等时再逐字节无符号比较。
//!
//! 与标准字典序不同，1 字节缓冲总是排在任意 2 字节缓冲之前。定长或短键空间中，
//! 这种排序可以在长度不同时省掉逐字节比较。

use core::cmp::Ordering;

/// 缓冲比较规则，供 [`crate::buf::Buf::compare_to`] 与各实现的 `Ord` 使用。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VariableLengthLexicographicComparator;

impl VariableLengthLexicographicComparator {
    pub const INSTANCE: VariableLengthLexicographicComparator = VariableLengthLexicographicComparator;

    /// 比较两段字节。
    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }

    /// 在长度相等的前提下，由调用方提供首个不同字节的位置完成比较。
    ///
    /// 原生内存路径通过 mismatch 探针拿到 `first_mismatch`，无需再物化整段字节。
    #[inline]
    pub fn compare_with_mismatch(
        &self,
        a_len: usize,
        b_len: usize,
        first_mismatch: Option<(u8, u8)>,
    ) -> Ordering {
        a_len.cmp(&b_len).then_with(|| match first_mismatch {
            Some((x, y)) => x.cmp(&y),
            None => Ordering::Equal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_sorts_first_regardless_of_content() {
        let cmp = VariableLengthLexicographicComparator::INSTANCE;
        assert_eq!(cmp.compare(&[5], &[1, 1]), Ordering::Less);
        assert_eq!(cmp.compare(&[0xFF, 0], &[0x01, 0xFF]), Ordering::Greater);
        assert_eq!(cmp.compare(&[], &[]), Ordering::Equal);
    }

    #[test]
    fn bytes_compare_unsigned() {
        let cmp = VariableLengthLexicographicComparator;
        assert_eq!(cmp.compare(&[0x80], &[0x7F]), Ordering::Greater);
    }
}
