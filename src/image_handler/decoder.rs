//! # 解码器注册表
//!
//! ## 设计思路
//!
//! 以 `ImageFormat` 作为标签查固定的解码函数表，而不是开放式的 trait 对象继承；
//! 新增格式 = 表中一项 + 一个纯函数。
//!
//! ## 实现思路
//!
//! - 内置表通过 `once_cell::sync::Lazy` 构建一次，`builtin()` 克隆共享的函数指针。
//! - `with_decoder` 允许替换单项（例如测试中注入带计数器的解码器）。
//! - `Unknown` 或缺失项统一返回 `DecodeError::UnsupportedFormat`。

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{DecodeError, DecodedImage, ImageFormat, jpeg, png, svg};

/// 纯解码函数：同一输入可被重复、并发调用。
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<DecodedImage, DecodeError> + Send + Sync>;

static BUILTIN: Lazy<DecoderRegistry> = Lazy::new(|| DecoderRegistry {
    table: vec![
        (ImageFormat::Png, Arc::new(png::decode) as DecodeFn),
        (ImageFormat::Jpeg, Arc::new(jpeg::decode) as DecodeFn),
        (ImageFormat::Svg, Arc::new(svg::decode) as DecodeFn),
    ],
});

/// 格式到解码函数的映射表。
#[derive(Clone)]
pub struct DecoderRegistry {
    table: Vec<(ImageFormat, DecodeFn)>,
}

impl DecoderRegistry {
    /// 内置 PNG / JPEG / SVG 解码器。
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// 空表，所有格式都会被拒绝。
    pub fn empty() -> Self {
        Self { table: Vec::new() }
    }

    /// 替换（或新增）某一格式的解码函数。
    pub fn with_decoder<F>(mut self, format: ImageFormat, decode: F) -> Self
    where
        F: Fn(&[u8]) -> Result<DecodedImage, DecodeError> + Send + Sync + 'static,
    {
        let decode: DecodeFn = Arc::new(decode);
        match self.table.iter_mut().find(|(f, _)| *f == format) {
            Some(entry) => entry.1 = decode,
            None => self.table.push((format, decode)),
        }
        self
    }

    pub fn supports(&self, format: ImageFormat) -> bool {
        format != ImageFormat::Unknown && self.table.iter().any(|(f, _)| *f == format)
    }

    pub fn decode(&self, format: ImageFormat, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        if format == ImageFormat::Unknown {
            return Err(DecodeError::UnsupportedFormat);
        }

        let (_, decode) = self
            .table
            .iter()
            .find(|(f, _)| *f == format)
            .ok_or(DecodeError::UnsupportedFormat)?;
        decode(bytes)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.table.iter().map(|(format, _)| format))
            .finish()
    }
}

/// 使用内置注册表解码。
pub fn decode(format: ImageFormat, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    BUILTIN.decode(format, bytes)
}
