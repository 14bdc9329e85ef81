//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 图片链路的错误分两层：
//! - `DecodeError`：纯解码阶段（嗅探之后、字节已在内存中）的失败，不涉及 I/O。
//! - `ImageError`：加载器边界对外暴露的统一错误，包含路径、资源限制与内部错误。
//!
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按 `ImageErrorKind` 分支匹配。
//! 两者都实现 `Clone`，以便缓存把同一次失败结果分发给所有合并等待的调用方。

use std::path::PathBuf;

use serde::Serialize;

use super::ImageFormat;

/// 解码阶段错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// 嗅探结果为 `Unknown`，或注册表中没有对应解码器。
    #[error("unknown image format")]
    UnsupportedFormat,

    /// 格式已识别，但结构校验失败（校验和、截断、非法字段）。
    #[error("corrupt {format} data: {reason}")]
    CorruptData { format: ImageFormat, reason: String },

    /// 解码得到零尺寸或非有限尺寸。
    #[error("image has degenerate dimensions ({width}x{height})")]
    DegenerateDimensions { width: f64, height: f64 },
}

impl DecodeError {
    pub fn corrupt(format: ImageFormat, reason: impl Into<String>) -> Self {
        Self::CorruptData {
            format,
            reason: reason.into(),
        }
    }
}

/// 图片处理统一错误类型。
///
/// 在会话层会被包装为 `Diagnostic`，附带文档中的调用位置。
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageError {
    #[error("file not found (searched at {})", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read file {} ({reason})", path.display())]
    FileSystem { path: PathBuf, reason: String },

    #[error("failed to load image ({0})")]
    InvalidFormat(#[from] DecodeError),

    #[error("image exceeds resource limit ({0})")]
    ResourceLimit(String),

    #[error("internal image loader error ({0})")]
    Internal(String),
}

/// 机器可判定的错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageErrorKind {
    NotFound,
    FileSystem,
    UnsupportedFormat,
    CorruptData,
    DegenerateDimensions,
    ResourceLimit,
    Internal,
}

impl ImageErrorKind {
    /// 稳定的错误码，供诊断输出与日志检索。
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "E_NOT_FOUND",
            Self::FileSystem => "E_FILE_SYSTEM",
            Self::UnsupportedFormat => "E_UNSUPPORTED_FORMAT",
            Self::CorruptData => "E_CORRUPT_DATA",
            Self::DegenerateDimensions => "E_DEGENERATE_DIMENSIONS",
            Self::ResourceLimit => "E_RESOURCE_LIMIT",
            Self::Internal => "E_INTERNAL",
        }
    }
}

impl ImageError {
    pub fn kind(&self) -> ImageErrorKind {
        match self {
            Self::NotFound { .. } => ImageErrorKind::NotFound,
            Self::FileSystem { .. } => ImageErrorKind::FileSystem,
            Self::InvalidFormat(DecodeError::UnsupportedFormat) => {
                ImageErrorKind::UnsupportedFormat
            }
            Self::InvalidFormat(DecodeError::CorruptData { .. }) => ImageErrorKind::CorruptData,
            Self::InvalidFormat(DecodeError::DegenerateDimensions { .. }) => {
                ImageErrorKind::DegenerateDimensions
            }
            Self::ResourceLimit(_) => ImageErrorKind::ResourceLimit,
            Self::Internal(_) => ImageErrorKind::Internal,
        }
    }

    /// 错误发生的阶段，用于阶段耗时日志旁的失败定位。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::FileSystem { .. } => "read",
            Self::InvalidFormat(_) | Self::ResourceLimit(_) => "decode",
            Self::Internal(_) => "cache",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umbrella_message_wraps_decode_reason() {
        let err = ImageError::from(DecodeError::UnsupportedFormat);
        assert_eq!(err.to_string(), "failed to load image (unknown image format)");
        assert_eq!(err.kind(), ImageErrorKind::UnsupportedFormat);
    }

    #[test]
    fn not_found_mentions_path() {
        let err = ImageError::NotFound {
            path: PathBuf::from("/tmp/missing.png"),
        };
        assert!(err.to_string().starts_with("file not found"));
        assert!(err.to_string().contains("missing.png"));
        assert_eq!(err.kind().code(), "E_NOT_FOUND");
        assert_eq!(err.stage(), "read");
    }

    #[test]
    fn corrupt_and_degenerate_map_to_distinct_kinds() {
        let corrupt = ImageError::from(DecodeError::corrupt(ImageFormat::Png, "crc mismatch"));
        let degenerate = ImageError::from(DecodeError::DegenerateDimensions {
            width: 0.0,
            height: 4.0,
        });

        assert_eq!(corrupt.kind(), ImageErrorKind::CorruptData);
        assert_eq!(degenerate.kind(), ImageErrorKind::DegenerateDimensions);
        assert_eq!(
            corrupt.to_string(),
            "failed to load image (corrupt png data: crc mismatch)"
        );
    }
}
