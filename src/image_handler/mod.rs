//! # 图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“来源读取 → 格式嗅探 → 解码 → 缓存 → 尺寸计算”按职责拆分为多个子模块，
//! 避免单文件膨胀与耦合。
//!
//! - `service`：承载会话状态（`ImageSession`），附加调用位置
//! - `handler`：编排整条处理链路（`ImageLoader`）
//! - `loader`：负责文件/内联/Data URL 读取与体积校验
//! - `pipeline`：负责嗅探、像素限制与解码分派
//! - `cache`：按内容指纹缓存解码结果，合并并发请求
//! - `sniff`：根据文件头识别格式
//! - `decoder`：格式到解码函数的注册表；`png`/`jpeg`/`svg` 为具体解码器
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! 排版层（或 CLI）
//!    ↓
//! service.rs（会话入口，错误 → Diagnostic）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ loader.rs（读取字节 + 体积校验）
//!    ├─ cache.rs（指纹查找 / 合并等待）
//!    │    └─ pipeline.rs（嗅探 + 像素限制 + 解码）
//!    │         └─ decoder.rs → png.rs / jpeg.rs / svg.rs
//!    └─ sizing（渲染框计算）
//!    ↓
//! 返回 SizedImage 或 Diagnostic
//! ```
//!
//! ## 分层职责建议
//!
//! - 新增图片格式：`sniff.rs` 增加识别 + 新解码器文件 + `decoder.rs` 注册一项
//! - 配置与阈值变更优先改 `config.rs`
//! - 流程顺序变更优先改 `handler.rs`
//! - 缓存策略变更只改 `cache.rs`

mod cache;
mod config;
mod decoder;
mod error;
mod handler;
mod jpeg;
mod loader;
mod pipeline;
mod png;
mod service;
mod sniff;
mod source;
mod svg;

pub use cache::{CacheKey, CacheStats, ImageCache};
pub use config::ImageConfig;
pub use decoder::{DecodeFn, DecoderRegistry, decode};
pub use error::{DecodeError, ImageError, ImageErrorKind};
pub use handler::ImageLoader;
pub use service::{ImageRequest, ImageSession};
pub use sniff::{ImageFormat, SNIFF_PREFIX_LEN, sniff};
pub use source::{
    DEFAULT_RASTER_DPI, DecodedImage, ImagePayload, Resolution, SVG_UNITS_PER_INCH, SizedImage,
    SourceReference,
};
