//! # 会话层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `ImageSession` 作为一次文档构建的图片服务状态，替代全局单例。
//! 好处：
//! 1. 生命周期清晰：会话销毁即释放其缓存
//! 2. 测试可创建独立实例，互不共享缓存
//! 3. 可按构建注入不同配置或解码器
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `place`：执行完整加载链路，错误附带调用位置
//! - `place_async`：在 tokio 阻塞线程池上执行 `place`
//! - `set_config` / `config`：读写配置
//! - `cache_stats` / `invalidate` / `clear_cache`：缓存观测与失效

use std::path::Path;
use std::sync::Arc;

use super::cache::CacheStats;
use super::{DecoderRegistry, ImageConfig, ImageError, ImageLoader, SizedImage, SourceReference};
use crate::error::{Diagnostic, SourceSpan};
use crate::sizing::{ContainerRegion, SizingDirective};

/// 一次图片放置请求。
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub source: SourceReference,
    pub directive: SizingDirective,
    pub container: ContainerRegion,
    /// 文档中引用该图片的位置，用于诊断输出。
    pub origin: Option<SourceSpan>,
}

impl ImageRequest {
    pub fn new(source: SourceReference) -> Self {
        Self {
            source,
            directive: SizingDirective::natural(),
            container: ContainerRegion::unbounded(),
            origin: None,
        }
    }

    pub fn with_directive(mut self, directive: SizingDirective) -> Self {
        self.directive = directive;
        self
    }

    pub fn with_container(mut self, container: ContainerRegion) -> Self {
        self.container = container;
        self
    }

    pub fn with_origin(mut self, origin: SourceSpan) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// 图片会话状态。
///
/// 每次文档构建创建一个，内部持有 `ImageLoader`（含缓存）。
pub struct ImageSession {
    loader: ImageLoader,
}

impl ImageSession {
    /// 使用默认配置创建会话。
    ///
    /// # 示例
    /// ```rust
    /// use image_embed::image_handler::ImageSession;
    ///
    /// let session = ImageSession::new()?;
    /// assert_eq!(session.cache_stats().entries, 0);
    /// # Ok::<(), image_embed::image_handler::ImageError>(())
    /// ```
    pub fn new() -> Result<Self, ImageError> {
        Self::with_config(ImageConfig::default())
    }

    /// 使用自定义配置创建会话。
    ///
    /// # 示例
    /// ```rust
    /// use image_embed::image_handler::{ImageConfig, ImageSession};
    ///
    /// let config = ImageConfig {
    ///     max_decoded_pixels: 4_000_000,
    ///     ..ImageConfig::default()
    /// };
    /// let session = ImageSession::with_config(config)?;
    /// # Ok::<(), image_embed::image_handler::ImageError>(())
    /// ```
    pub fn with_config(config: ImageConfig) -> Result<Self, ImageError> {
        Self::with_registry(config, DecoderRegistry::builtin())
    }

    /// 使用自定义解码器注册表创建会话。
    pub fn with_registry(config: ImageConfig, registry: DecoderRegistry) -> Result<Self, ImageError> {
        let loader = ImageLoader::with_registry(config, registry)?;
        log::debug!("🧩 图片会话已创建");
        Ok(Self { loader })
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// 执行完整加载链路：读取→解码（缓存）→计算渲染框。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_embed::error::SourceSpan;
    /// use image_embed::image_handler::{ImageRequest, ImageSession, SourceReference};
    ///
    /// let session = ImageSession::new().expect("session");
    /// let request = ImageRequest::new(SourceReference::path("/doc/figures/plot.png"))
    ///     .with_origin(SourceSpan::new("/doc/main.typ", 120, 148));
    ///
    /// match session.place(&request) {
    ///     Ok(placed) => println!("{:?}", placed.render_box),
    ///     Err(diagnostic) => eprintln!("{diagnostic}"),
    /// }
    /// ```
    pub fn place(&self, request: &ImageRequest) -> Result<SizedImage, Diagnostic> {
        self.loader
            .load_sized(&request.source, request.directive, request.container)
            .map_err(|error| {
                Diagnostic::new(
                    error,
                    request.source.resolved_path(),
                    request.origin.as_ref(),
                )
            })
    }

    /// 在 tokio 阻塞线程池上执行 `place`，适合异步构建驱动。
    pub async fn place_async(self: Arc<Self>, request: ImageRequest) -> Result<SizedImage, Diagnostic> {
        let path = request.source.resolved_path().to_path_buf();
        let origin = request.origin.clone();

        match tokio::task::spawn_blocking(move || self.place(&request)).await {
            Ok(result) => result,
            Err(join_error) => Err(Diagnostic::new(
                ImageError::Internal(format!("image task failed: {join_error}")),
                path,
                origin.as_ref(),
            )),
        }
    }

    /// 校验并替换配置。
    pub fn set_config(&self, config: ImageConfig) -> Result<(), ImageError> {
        self.loader.set_config(config)
    }

    pub fn config(&self) -> Result<ImageConfig, ImageError> {
        self.loader.config()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.loader.cache_stats()
    }

    /// 使某路径的缓存条目失效，返回移除数量。
    pub fn invalidate(&self, path: &Path) -> usize {
        let removed = self.loader.cache().invalidate_path(path);
        log::debug!("🧹 缓存失效 - 路径: {} 移除: {}", path.display(), removed);
        removed
    }

    pub fn clear_cache(&self) {
        self.loader.cache().clear();
        log::debug!("🧹 已清空图片缓存");
    }
}
