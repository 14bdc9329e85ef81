//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ImageConfig`，保证运行时行为可观测、可调整、可测试。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的上限配置。
//! - 通过 `serde` 支持从 JSON 文件加载，缺省字段回退默认值。
//! - `validate` 在替换配置前统一校验，避免运行中出现不可用的阈值。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImageError;

const MIN_DECODED_BYTES: u64 = 1024 * 1024;

/// 图片处理配置。
///
/// 字段覆盖读取与解码两个阶段的资源上限。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`），仅对位图生效。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 扩展名与嗅探结果不一致时是否输出告警日志。
    pub warn_on_extension_mismatch: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            warn_on_extension_mismatch: true,
        }
    }
}

impl ImageConfig {
    /// 从 JSON 文件加载配置；文件不存在时返回默认配置。
    pub fn load_from_path(path: &Path) -> Result<Self, ImageError> {
        if !path.exists() {
            log::debug!("⚙️ 配置文件不存在，使用默认配置：{}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ImageError::FileSystem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ImageError::FileSystem {
            path: path.to_path_buf(),
            reason: format!("invalid config: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// 校验阈值是否可用。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_file_size == 0 {
            return Err(ImageError::ResourceLimit(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.max_decoded_pixels == 0 {
            return Err(ImageError::ResourceLimit(
                "max_decoded_pixels must be greater than 0".to_string(),
            ));
        }
        if self.max_decoded_bytes < MIN_DECODED_BYTES {
            return Err(ImageError::ResourceLimit(format!(
                "max_decoded_bytes must be at least {MIN_DECODED_BYTES}"
            )));
        }

        Ok(())
    }
}
