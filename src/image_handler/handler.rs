//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageLoader` 只负责流程编排与配置管理，不关心调用方是同步排版还是异步任务。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源读取原始字节
//! 3. 计算内容指纹，查询解码缓存
//! 4. 未命中时嗅探 + 解码（缓存保证同一键只解码一次）
//! 5. 按尺寸指令与容器计算渲染框
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时替换。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/decode/size/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::cache::{CacheKey, CacheStats, ImageCache};
use super::{DecodedImage, DecoderRegistry, ImageConfig, ImageError, SizedImage, SourceReference};
use crate::sizing::{self, ContainerRegion, RenderBox, SizingDirective};

/// 图片加载器。
///
/// 封装配置状态、解码缓存与解码器注册表，并编排各子模块实现完整流程。
pub struct ImageLoader {
    pub(super) config: Arc<RwLock<ImageConfig>>,
    pub(super) cache: ImageCache,
    pub(super) registry: DecoderRegistry,
}

struct Fetched {
    image: Arc<DecodedImage>,
    load_elapsed: Duration,
    decode_elapsed: Duration,
}

impl ImageLoader {
    /// 根据初始配置创建加载器，使用内置解码器。
    ///
    /// # 示例
    /// ```rust
    /// use image_embed::image_handler::{ImageConfig, ImageLoader};
    ///
    /// let loader = ImageLoader::new(ImageConfig::default())?;
    /// # Ok::<(), image_embed::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Result<Self, ImageError> {
        Self::with_registry(config, DecoderRegistry::builtin())
    }

    /// 使用自定义解码器注册表创建加载器。
    pub fn with_registry(config: ImageConfig, registry: DecoderRegistry) -> Result<Self, ImageError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            cache: ImageCache::new(),
            registry,
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub(crate) fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::Internal("config read lock poisoned".to_string()))
    }

    /// 当前生效配置。
    pub fn config(&self) -> Result<ImageConfig, ImageError> {
        self.config_snapshot()
    }

    /// 校验并替换配置；已缓存的图片不受影响。
    pub fn set_config(&self, next: ImageConfig) -> Result<(), ImageError> {
        next.validate()?;

        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::Internal("config write lock poisoned".to_string()))?;
        *config = next;

        log::info!(
            "⚙️ 已更新图片配置（max_file_size={}, max_pixels={}, max_decoded_bytes={}）",
            config.max_file_size,
            config.max_decoded_pixels,
            config.max_decoded_bytes
        );

        Ok(())
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// 加载并计算渲染框。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_embed::image_handler::{ImageConfig, ImageLoader, SourceReference};
    /// use image_embed::sizing::{ContainerRegion, SizingDirective};
    ///
    /// let loader = ImageLoader::new(ImageConfig::default())?;
    /// let render_box = loader.load(
    ///     &SourceReference::path("/doc/figures/plot.png"),
    ///     SizingDirective::width(200.0),
    ///     ContainerRegion::bounded(400.0, 600.0),
    /// )?;
    /// println!("{}x{}", render_box.width, render_box.height);
    /// # Ok::<(), image_embed::image_handler::ImageError>(())
    /// ```
    pub fn load(
        &self,
        source: &SourceReference,
        directive: SizingDirective,
        container: ContainerRegion,
    ) -> Result<RenderBox, ImageError> {
        self.load_sized(source, directive, container)
            .map(|sized| sized.render_box)
    }

    /// 加载并返回共享图片句柄与渲染框。
    pub fn load_sized(
        &self,
        source: &SourceReference,
        directive: SizingDirective,
        container: ContainerRegion,
    ) -> Result<SizedImage, ImageError> {
        let total_start = Instant::now();
        let config = self.config_snapshot()?;

        let fetched = self.fetch(source, &config)?;

        let size_start = Instant::now();
        let render_box = sizing::resolve(fetched.image.intrinsic_size(), directive, container);
        let size_elapsed = size_start.elapsed();

        log::info!(
            "✅ 图片放置完成 - 路径: {} 框: {:.1}x{:.1}pt load={}ms decode={}ms size={}µs total={}ms",
            source.resolved_path().display(),
            render_box.width,
            render_box.height,
            fetched.load_elapsed.as_millis(),
            fetched.decode_elapsed.as_millis(),
            size_elapsed.as_micros(),
            total_start.elapsed().as_millis()
        );

        Ok(SizedImage {
            image: fetched.image,
            render_box,
        })
    }

    /// 只加载图片，不计算尺寸。
    pub fn load_image(&self, source: &SourceReference) -> Result<Arc<DecodedImage>, ImageError> {
        let config = self.config_snapshot()?;
        self.fetch(source, &config).map(|fetched| fetched.image)
    }

    fn fetch(&self, source: &SourceReference, config: &ImageConfig) -> Result<Fetched, ImageError> {
        let path = source.resolved_path();

        let load_start = Instant::now();
        let raw = Self::read_raw(source, config).inspect_err(|e| Self::log_failure(source, e))?;
        let key = CacheKey::for_bytes(path, &raw.bytes);
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let image = self
            .cache
            .get_or_load(&key, || self.decode_raw(&raw, path, config))
            .inspect_err(|e| Self::log_failure(source, e))?;
        let decode_elapsed = decode_start.elapsed();

        Ok(Fetched {
            image,
            load_elapsed,
            decode_elapsed,
        })
    }

    fn log_failure(source: &SourceReference, error: &ImageError) {
        log::warn!(
            "❌ 图片加载失败 - 阶段: {} 路径: {} 原因: {}",
            error.stage(),
            source.resolved_path().display(),
            error
        );
    }
}
