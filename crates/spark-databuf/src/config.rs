//! 缓冲与编解码层的可调参数。
//!
//! 参数均有默认值，可从 TOML 片段加载：
//!
//! ```toml
//! write_chunk_size = 65536
//! encoder_scratch_size = 8192
//! output_initial_capacity = 32
//! output_limit = 1048576
//! ```
//!
//! 未知字段直接拒绝，避免拼写错误的键被静默忽略。

use serde::{Deserialize, Serialize};

use crate::{
    buf::DEFAULT_WRITE_CHUNK_SIZE,
    encoder::{DEFAULT_SCRATCH_SIZE, EncoderPolicy, ZeroAllocationEncoder},
    error::{DataError, Result},
};

const DEFAULT_OUTPUT_INITIAL_CAPACITY: usize = 32;

/// 编解码参数集合。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataBufConfig {
    /// `Buf::write_to_chunked` 的分块大小。
    pub write_chunk_size: usize,
    /// 每次编码调用使用的线程本地草稿区大小。
    pub encoder_scratch_size: usize,
    /// `BufDataOutput` 初始容量。
    pub output_initial_capacity: usize,
    /// `BufDataOutput` 硬上限；`None` 表示不限。
    pub output_limit: Option<usize>,
}

impl Default for DataBufConfig {
    fn default() -> Self {
        Self {
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            encoder_scratch_size: DEFAULT_SCRATCH_SIZE,
            output_initial_capacity: DEFAULT_OUTPUT_INITIAL_CAPACITY,
            output_limit: None,
        }
    }
}

impl DataBufConfig {
    /// 解析并校验 TOML 配置。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: DataBufConfig = toml::from_str(source)
            .map_err(|err| DataError::invalid_argument(format!("invalid databuf config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_chunk_size == 0 {
            return Err(DataError::invalid_argument("write_chunk_size must be positive"));
        }
        if self.encoder_scratch_size == 0 {
            return Err(DataError::invalid_argument("encoder_scratch_size must be positive"));
        }
        if let Some(limit) = self.output_limit
            && self.output_initial_capacity > limit
        {
            return Err(DataError::invalid_argument(format!(
                "output_initial_capacity {} exceeds output_limit {limit}",
                self.output_initial_capacity
            )));
        }
        Ok(())
    }

    /// 按本配置的草稿区大小构造转码器。
    pub fn encoder(&self, policy: EncoderPolicy) -> ZeroAllocationEncoder {
        ZeroAllocationEncoder::new(policy).with_scratch_size(self.encoder_scratch_size)
    }
}
