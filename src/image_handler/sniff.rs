//! # 格式嗅探模块
//!
//! ## 设计思路
//!
//! 只看固定长度的文件头（magic bytes），不做完整解析，也不信任扩展名。
//! 对截断或过短输入返回 `Unknown`，永不失败。
//!
//! ## 实现思路
//!
//! - 位图签名交给 `infer` 识别（PNG / JPEG）。
//! - SVG 属于文本格式，`infer` 无法识别，改用预编译正则匹配前缀中的 `<svg` 根元素，
//!   允许前置 BOM、空白、任意数量的处理指令（`<?xml ...?>`、`<?xml-stylesheet ...?>`）、
//!   注释，以及带内部子集（`[ <!ENTITY ...> ]`）的 DOCTYPE。
//! - 正则通过 `once_cell::sync::Lazy` 在首次调用时编译，后续零成本复用。

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// 嗅探时最多检查的前缀字节数。
pub const SNIFF_PREFIX_LEN: usize = 512;

static SVG_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^\u{FEFF}?\s*((<\?[^>]*\?>|<!--.*?-->|<!DOCTYPE[^>\[]*(\[.*?\])?\s*>)\s*)*<svg[\s>/]",
    )
    .expect("static svg sniff pattern must compile")
});

/// 已知的编码格式（封闭枚举）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Svg,
    Unknown,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Svg => "svg",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_raster(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }

    /// 根据扩展名给出的格式提示，仅用于日志告警，不参与解码分派。
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" | "jpe" | "jfif" => Self::Jpeg,
            "svg" => Self::Svg,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 根据文件头识别编码格式。
///
/// 最多读取 [`SNIFF_PREFIX_LEN`] 字节。
pub fn sniff(bytes: &[u8]) -> ImageFormat {
    let prefix = &bytes[..bytes.len().min(SNIFF_PREFIX_LEN)];
    if prefix.is_empty() {
        return ImageFormat::Unknown;
    }

    if let Some(kind) = infer::get(prefix) {
        match kind.mime_type() {
            "image/png" => return ImageFormat::Png,
            "image/jpeg" => return ImageFormat::Jpeg,
            other if kind.matcher_type() == infer::MatcherType::Image => {
                log::debug!("🔍 识别到图片类型 {}，但没有对应解码器", other);
                return ImageFormat::Unknown;
            }
            _ => {}
        }
    }

    let text = String::from_utf8_lossy(prefix);
    if SVG_ROOT.is_match(&text) {
        return ImageFormat::Svg;
    }

    ImageFormat::Unknown
}
