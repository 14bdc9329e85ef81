//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `SourceReference` 表示文档层给出的图片来源（已解析的路径，可选内联字节）
//! - `RawImageData` 表示已加载但未解码的字节
//! - `DecodedImage` 表示解码完成、尺寸已校验的不可变图片
//! - `SizedImage` 表示交给排版层的最终产物（共享图片句柄 + 渲染框）

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use resvg::usvg;
use serde::Serialize;

use super::{DecodeError, ImageFormat};
use crate::sizing::{RenderBox, Size};

/// 位图默认分辨率：未声明 DPI 时 1 像素 = 1 点。
pub const DEFAULT_RASTER_DPI: f64 = 72.0;

/// SVG 用户单位按 CSS 像素（96 DPI）换算为点。
pub const SVG_UNITS_PER_INCH: f64 = 96.0;

const POINTS_PER_INCH: f64 = 72.0;

/// 位图分辨率（DPI），横纵两轴分别记录。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Resolution {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn uniform(dpi: f64) -> Self {
        Self { x: dpi, y: dpi }
    }

    fn is_valid(&self) -> bool {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        valid(self.x) && valid(self.y)
    }
}

/// 图片输入来源。
///
/// 构造后不可变；内联字节通过 `Arc` 共享，克隆开销恒定。
#[derive(Clone)]
pub struct SourceReference {
    path: PathBuf,
    inline: Option<Arc<[u8]>>,
}

impl SourceReference {
    /// 本地文件来源（路径已由文档层展开为绝对路径）。
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inline: None,
        }
    }

    /// 内联字节来源，`identity` 仅作为缓存键与诊断中的路径。
    pub fn inline(identity: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: identity.into(),
            inline: Some(bytes.into()),
        }
    }

    pub fn resolved_path(&self) -> &Path {
        &self.path
    }

    pub fn inline_bytes(&self) -> Option<&[u8]> {
        self.inline.as_deref()
    }

    pub fn is_inline(&self) -> bool {
        self.inline.is_some()
    }

    pub(crate) fn inline_handle(&self) -> Option<Arc<[u8]>> {
        self.inline.clone()
    }
}

impl fmt::Debug for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceReference")
            .field("path", &self.path)
            .field("inline_len", &self.inline.as_ref().map(|bytes| bytes.len()))
            .finish()
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Arc<[u8]>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码后的载荷。
pub enum ImagePayload {
    Raster {
        pixels: DynamicImage,
        pixel_width: u32,
        pixel_height: u32,
        /// 文件内声明的分辨率（PNG `pHYs` / JPEG JFIF）。
        dpi: Option<Resolution>,
    },
    Vector {
        tree: usvg::Tree,
    },
}

/// 解码完成的图片。
///
/// 不变量：`width > 0 && height > 0` 且均为有限值，只能通过 [`DecodedImage::new`] 构造。
/// 插入缓存后不再修改，以 `Arc` 在多个排版位置间共享。
pub struct DecodedImage {
    format: ImageFormat,
    width: f64,
    height: f64,
    payload: ImagePayload,
}

impl DecodedImage {
    /// 校验固有尺寸（单位：点）并构造图片。
    pub fn new(
        format: ImageFormat,
        width: f64,
        height: f64,
        payload: ImagePayload,
    ) -> Result<Self, DecodeError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(DecodeError::DegenerateDimensions { width, height });
        }

        Ok(Self {
            format,
            width,
            height,
            payload,
        })
    }

    /// 由像素尺寸与可选 DPI 构造位图。
    ///
    /// 横纵分辨率分别换算；任一轴无效时整体按 [`DEFAULT_RASTER_DPI`] 处理。
    pub fn raster(
        format: ImageFormat,
        pixels: DynamicImage,
        dpi: Option<Resolution>,
    ) -> Result<Self, DecodeError> {
        let (pixel_width, pixel_height) = (pixels.width(), pixels.height());
        let dpi = dpi.filter(Resolution::is_valid);
        let effective = dpi.unwrap_or(Resolution::uniform(DEFAULT_RASTER_DPI));

        Self::new(
            format,
            pixel_width as f64 * POINTS_PER_INCH / effective.x,
            pixel_height as f64 * POINTS_PER_INCH / effective.y,
            ImagePayload::Raster {
                pixels,
                pixel_width,
                pixel_height,
                dpi,
            },
        )
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// 固有宽度（点）。
    pub fn width(&self) -> f64 {
        self.width
    }

    /// 固有高度（点）。
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn intrinsic_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    /// 位图的像素尺寸；矢量图返回 `None`。
    pub fn pixel_size(&self) -> Option<(u32, u32)> {
        match &self.payload {
            ImagePayload::Raster {
                pixel_width,
                pixel_height,
                ..
            } => Some((*pixel_width, *pixel_height)),
            ImagePayload::Vector { .. } => None,
        }
    }

    pub fn dpi(&self) -> Option<Resolution> {
        match &self.payload {
            ImagePayload::Raster { dpi, .. } => *dpi,
            ImagePayload::Vector { .. } => None,
        }
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_size", &self.pixel_size())
            .finish()
    }
}

/// 交给排版层的图片产物。
#[derive(Debug, Clone)]
pub struct SizedImage {
    pub image: Arc<DecodedImage>,
    pub render_box: RenderBox,
}
