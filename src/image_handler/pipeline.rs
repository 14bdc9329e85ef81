//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 格式 → 解码图片”的过程集中管理，并在关键节点增加资源上限控制。
//! 位图优先读取 header 尺寸做限制检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 嗅探格式（只看内容，不看扩展名）
//! 2. 扩展名与嗅探结果不一致时告警
//! 3. 位图：读取 header 尺寸，按像素/内存上限快速拒绝
//! 4. 按注册表分派解码
//! 5. 位图解码后再校验一次实际尺寸
//!
//! 本模块只在缓存未命中时由 owner 线程调用。

use std::io::Cursor;
use std::path::Path;

use super::source::RawImageData;
use super::{DecodedImage, ImageConfig, ImageError, ImageFormat, ImageLoader, sniff};

impl ImageLoader {
    /// 将原始字节解码为不可变图片。
    pub(super) fn decode_raw(
        &self,
        raw: &RawImageData,
        path: &Path,
        config: &ImageConfig,
    ) -> Result<DecodedImage, ImageError> {
        let format = sniff(&raw.bytes);
        log::debug!("🔍 格式嗅探结果 - 路径: {} 格式: {}", path.display(), format);

        if config.warn_on_extension_mismatch {
            Self::warn_on_extension_mismatch(path, format);
        }

        if format.is_raster() {
            if let Some((width, height)) = Self::inspect_dimensions_from_memory(&raw.bytes) {
                Self::validate_pixel_limits(config, width, height)?;
                Self::validate_decoded_memory_limits(config, width, height)?;
            }
        }

        let decoded = self.registry.decode(format, &raw.bytes)?;

        if let Some((width, height)) = decoded.pixel_size() {
            Self::validate_pixel_limits(config, width, height)?;
            Self::validate_decoded_memory_limits(config, width, height)?;
        }

        log::info!(
            "✅ 图片解码成功 - 来源: {} 格式: {} 尺寸: {:.1}x{:.1}pt",
            raw.source_hint,
            decoded.format(),
            decoded.width(),
            decoded.height()
        );

        Ok(decoded)
    }

    fn warn_on_extension_mismatch(path: &Path, sniffed: ImageFormat) {
        let hinted = ImageFormat::from_extension(path);
        if hinted != ImageFormat::Unknown && sniffed != ImageFormat::Unknown && hinted != sniffed {
            log::warn!(
                "⚠️ 扩展名与内容不一致 - 路径: {} 扩展名: {} 实际: {}",
                path.display(),
                hinted,
                sniffed
            );
        }
    }

    /// 仅通过内存中的图片头信息读取宽高。
    ///
    /// 读取失败时返回 `None`，由对应解码器给出精确的错误分类。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Option<(u32, u32)> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;

        match reader.into_dimensions() {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                log::debug!("🔍 header 尺寸读取失败，交给解码器处理：{}", e);
                None
            }
        }
    }

    /// 校验像素数量是否超过配置上限。
    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("pixel count overflow".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "{width}x{height} = {pixels} pixels (limit {})",
                config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("decoded size overflow".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "estimated decoded size {:.2} MB (limit {:.2} MB)",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}
