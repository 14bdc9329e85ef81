//! # 读取与校验模块
//!
//! ## 设计思路
//!
//! 统一处理两类来源（本地文件 / 内联字节）的原始字节读取，并在“尽可能早”的阶段执行体积校验。
//! 目标是尽快失败，避免把超限输入交给解码阶段。
//!
//! ## 实现思路
//!
//! - 文件：metadata（存在性 + 目录检查 + 体积限制）→ 一次性读取。
//! - 内联：直接复用 `Arc<[u8]>`，只做体积限制。
//! - Data URL：`data:image/...;base64,` 前缀解析 + 按配置上限预估解码体积，再交给 `base64` 解码。
//! - I/O 错误统一映射到 `ImageError`，`NotFound` 单独区分。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};

use super::source::RawImageData;
use super::{ImageConfig, ImageError, ImageLoader, SourceReference};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

impl SourceReference {
    /// 从 `data:image/png;base64,...` 形式的字符串构造内联来源。
    ///
    /// 也接受不带 `data:` 前缀的纯 Base64 文本。解码前按 `config.max_file_size`
    /// 预估体积，超限返回 `ResourceLimit`；加载时仍会按实际字节数再校验一次。
    ///
    /// # 示例
    /// ```rust
    /// use image_embed::image_handler::{ImageConfig, SourceReference};
    ///
    /// let config = ImageConfig::default();
    /// let source = SourceReference::from_data_url("inline.png", "data:image/png;base64,iVBORw0KGgo=", &config)?;
    /// assert!(source.is_inline());
    /// # Ok::<(), image_embed::image_handler::ImageError>(())
    /// ```
    pub fn from_data_url(
        identity: impl Into<PathBuf>,
        data: &str,
        config: &ImageConfig,
    ) -> Result<Self, ImageError> {
        let identity = identity.into();
        let bytes = ImageLoader::parse_data_url_with_limit(data, config.max_file_size)
            .map_err(|e| e.into_image_error(&identity))?;

        Ok(Self::inline(identity, bytes))
    }
}

/// Data URL 解析失败的原因，由调用方补上来源标识。
#[derive(Debug)]
pub(super) enum DataUrlError {
    Malformed(String),
    TooLarge { estimated: u64, limit: u64 },
}

impl DataUrlError {
    fn into_image_error(self, identity: &Path) -> ImageError {
        match self {
            Self::Malformed(reason) => ImageError::FileSystem {
                path: identity.to_path_buf(),
                reason,
            },
            Self::TooLarge { estimated, limit } => ImageError::ResourceLimit(format!(
                "base64 payload too large: ~{estimated} bytes (limit {limit})"
            )),
        }
    }
}

impl ImageLoader {
    /// 按来源读取原始字节。
    pub(super) fn read_raw(
        source: &SourceReference,
        config: &ImageConfig,
    ) -> Result<RawImageData, ImageError> {
        match source.inline_handle() {
            Some(bytes) => {
                log::debug!(
                    "📝 使用内联图片字节 - 标识: {} 大小: {}B",
                    source.resolved_path().display(),
                    bytes.len()
                );
                Self::validate_file_size(bytes.len() as u64, config)?;

                Ok(RawImageData {
                    bytes,
                    source_hint: "inline",
                })
            }
            None => Self::read_file(source.resolved_path(), config),
        }
    }

    /// 从本地路径读取图片原始字节。
    fn read_file(path: &Path, config: &ImageConfig) -> Result<RawImageData, ImageError> {
        log::debug!("📁 开始读取本地图片 - 路径: {}", path.display());

        let metadata = fs::metadata(path).map_err(|e| Self::map_io_error(path, e))?;
        if metadata.is_dir() {
            return Err(ImageError::FileSystem {
                path: path.to_path_buf(),
                reason: "path is a directory".to_string(),
            });
        }
        Self::validate_file_size(metadata.len(), config)?;

        let bytes = fs::read(path).map_err(|e| Self::map_io_error(path, e))?;
        // metadata 与读取之间文件可能被替换，以实际读取长度为准再校验一次
        Self::validate_file_size(bytes.len() as u64, config)?;

        Ok(RawImageData {
            bytes: Arc::from(bytes),
            source_hint: "file",
        })
    }

    fn map_io_error(path: &Path, error: io::Error) -> ImageError {
        match error.kind() {
            io::ErrorKind::NotFound => ImageError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ImageError::FileSystem {
                path: path.to_path_buf(),
                reason: error.to_string(),
            },
        }
    }

    fn validate_file_size(len: u64, config: &ImageConfig) -> Result<(), ImageError> {
        if len > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "file too large: {:.2} MB (limit {:.2} MB)",
                len as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, String> {
        let len = base64_data.len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| "base64 input length overflow".to_string())?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| "base64 decoded size overflow".to_string())
    }

    /// 解析 Data URL / 纯 Base64，解码前先用预估体积挡掉超限输入。
    pub(super) fn parse_data_url_with_limit(
        data: &str,
        max_len: u64,
    ) -> Result<Vec<u8>, DataUrlError> {
        let normalized = data.trim();

        let payload = match normalized.strip_prefix(DATA_URL_PREFIX) {
            Some(rest) => {
                if !rest.starts_with("image/") {
                    return Err(DataUrlError::Malformed("data url is not an image".to_string()));
                }
                let marker = rest.find(BASE64_MARKER).ok_or_else(|| {
                    DataUrlError::Malformed("data url is missing the base64 marker".to_string())
                })?;
                &rest[marker + BASE64_MARKER.len()..]
            }
            None => normalized,
        };

        let estimated = Self::estimate_base64_decoded_upper_bound_len(payload)
            .map_err(DataUrlError::Malformed)?;
        if estimated > max_len {
            log::warn!("⚠️ Data URL 预估体积超限 - 约 {}B 限制 {}B", estimated, max_len);
            return Err(DataUrlError::TooLarge {
                estimated,
                limit: max_len,
            });
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| DataUrlError::Malformed(format!("invalid base64: {e}")))
    }
}
