//! 文本字符集。
//!
//! UTF-8 走 [`ZeroAllocationEncoder`] 的流式路径；其余字符集采用“先整体编码再写出”的传统路径，
//! 字节数在写出前即已确定，因此不需要回填长度前缀。

use serde::{Deserialize, Serialize};

use crate::{
    encoder::{EncoderPolicy, ZeroAllocationEncoder},
    error::{DataError, Result},
};

const LENIENT_ENCODE_REPLACEMENT: u8 = b'?';

/// 支持的字符集。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Be,
    Utf16Le,
    Iso8859_1,
    UsAscii,
}

impl Charset {
    pub const fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::UsAscii => "US-ASCII",
        }
    }

    #[inline]
    pub const fn is_utf8(self) -> bool {
        matches!(self, Charset::Utf8)
    }

    /// 将文本整体编码为字节。
    pub fn encode(self, text: &str, policy: EncoderPolicy) -> Result<Vec<u8>> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Charset::Iso8859_1 => self.encode_single_byte(text, 0xFF, policy),
            Charset::UsAscii => self.encode_single_byte(text, 0x7F, policy),
        }
    }

    fn encode_single_byte(self, text: &str, max: u32, policy: EncoderPolicy) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len());
        for ch in text.chars() {
            let code = u32::from(ch);
            if code <= max {
                out.push(code as u8);
                continue;
            }
            match policy {
                EncoderPolicy::Strict => {
                    return Err(DataError::encoding(
                        self.name(),
                        format!("unmappable character {ch:?}"),
                    ));
                }
                EncoderPolicy::Lenient => out.push(LENIENT_ENCODE_REPLACEMENT),
            }
        }
        Ok(out)
    }

    /// 将字节整体解码为文本。
    pub fn decode(self, bytes: &[u8], policy: EncoderPolicy) -> Result<String> {
        match self {
            Charset::Utf8 => ZeroAllocationEncoder::new(policy).decode_slice(bytes),
            Charset::Iso8859_1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| match (b.is_ascii(), policy) {
                    (true, _) => Ok(char::from(b)),
                    (false, EncoderPolicy::Lenient) => Ok(char::REPLACEMENT_CHARACTER),
                    (false, EncoderPolicy::Strict) => Err(DataError::encoding(
                        self.name(),
                        format!("byte {b:#04x} is not ASCII"),
                    )),
                })
                .collect(),
            Charset::Utf16Be => self.decode_utf16(bytes, u16::from_be_bytes, policy),
            Charset::Utf16Le => self.decode_utf16(bytes, u16::from_le_bytes, policy),
        }
    }

    fn decode_utf16(
        self,
        bytes: &[u8],
        unit: fn([u8; 2]) -> u16,
        policy: EncoderPolicy,
    ) -> Result<String> {
        let pairs = bytes.chunks_exact(2);
        let dangling = !pairs.remainder().is_empty();
        let units = pairs.map(|pair| unit([pair[0], pair[1]]));
        let mut out = String::with_capacity(bytes.len() / 2);
        for decoded in char::decode_utf16(units) {
            match (decoded, policy) {
                (Ok(ch), _) => out.push(ch),
                (Err(_), EncoderPolicy::Lenient) => out.push(char::REPLACEMENT_CHARACTER),
                (Err(err), EncoderPolicy::Strict) => {
                    return Err(DataError::encoding(
                        self.name(),
                        format!("unpaired surrogate {:#06x}", err.unpaired_surrogate()),
                    ));
                }
            }
        }
        if dangling {
            match policy {
                EncoderPolicy::Lenient => out.push(char::REPLACEMENT_CHARACTER),
                EncoderPolicy::Strict => {
                    return Err(DataError::encoding(self.name(), "odd trailing byte"));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_policy_split() {
        assert!(Charset::Iso8859_1.encode("€", EncoderPolicy::Strict).is_err());
        assert_eq!(
            Charset::Iso8859_1.encode("a€", EncoderPolicy::Lenient).unwrap(),
            b"a?"
        );
        assert_eq!(
            Charset::Iso8859_1.decode(&[0xE9], EncoderPolicy::Strict).unwrap(),
            "é"
        );
    }

    #[test]
    fn utf16_round_trips_surrogate_pairs() {
        let text = "x😀";
        for charset in [Charset::Utf16Be, Charset::Utf16Le] {
            let bytes = charset.encode(text, EncoderPolicy::Strict).unwrap();
            assert_eq!(bytes.len(), 6);
            assert_eq!(charset.decode(&bytes, EncoderPolicy::Strict).unwrap(), text);
        }
        assert!(
            Charset::Utf16Be
                .decode(&[0xD8, 0x00], EncoderPolicy::Strict)
                .is_err()
        );
    }
}
