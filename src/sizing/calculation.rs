//! 渲染框计算模块
//!
//! 该模块实现图片尺寸解析的核心算法，分四种情形：
//!
//! 1. **宽高均显式**：原样采用，宽高比被有意覆盖（强制拉伸）。
//! 2. **仅宽度显式**：高度按固有宽高比推算。
//! 3. **仅高度显式**：宽度按固有宽高比推算。
//! 4. **均未给出**：默认固有尺寸，仅在有限容器轴上按需等比缩小（从不放大）。
//!
//! # 设计思路
//!
//! - 算法纯函数化：输入为固有尺寸、指令、容器，输出唯一渲染框，便于测试。
//! - 显式指令永远优先于容器适配；适配只发生在情形 4。
//! - 不返回错误：零尺寸固有值已由 `DecodedImage` 的不变量排除，这里只做调试断言。
//! - 显式指令的合法性（有限、非负）由调用方在接收用户输入时校验，这里同样只做调试断言。

use super::{ContainerRegion, RenderBox, Size, SizingDirective};

/// 计算图片最终渲染框。
///
/// # 参数
/// * `intrinsic` - 解码得到的固有尺寸（点），两轴均需大于 0
/// * `directive` - 文档层的显式宽高指令，调用方需保证 [`SizingDirective::is_valid`]
/// * `container` - 排版层提供的可用空间
///
/// # 后置条件
/// - 宽高均显式：`result.size() == (w, h)`
/// - 仅一边显式：`result.height / result.width == intrinsic.height / intrinsic.width`
/// - 均未给出：`result` 不超过任一有限容器轴，且不大于固有尺寸
///
/// # 示例
/// ```
/// use image_embed::sizing::{resolve, ContainerRegion, Size, SizingDirective};
///
/// let fitted = resolve(
///     Size::new(400.0, 200.0),
///     SizingDirective::natural(),
///     ContainerRegion::bounded(100.0, 1000.0),
/// );
/// assert_eq!((fitted.width, fitted.height), (100.0, 50.0));
/// ```
pub fn resolve(intrinsic: Size, directive: SizingDirective, container: ContainerRegion) -> RenderBox {
    debug_assert!(
        intrinsic.width > 0.0 && intrinsic.height > 0.0,
        "intrinsic size must be positive, got {intrinsic:?}"
    );
    debug_assert!(
        directive.is_valid(),
        "explicit extents must be finite and non-negative, got {directive:?}"
    );

    let Size {
        width: iw,
        height: ih,
    } = intrinsic;

    let (width, height) = match (directive.width, directive.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * ih / iw),
        (None, Some(h)) => (h * iw / ih, h),
        (None, None) => {
            let scale = fit_scale(intrinsic, container);
            (iw * scale, ih * scale)
        }
    };

    RenderBox {
        width,
        height,
        scale_x: width / iw,
        scale_y: height / ih,
    }
}

/// 均未给出指令时的缩放比例：取各有限轴允许的最小比例，并封顶为 1。
fn fit_scale(intrinsic: Size, container: ContainerRegion) -> f64 {
    let by_width = container
        .finite_width()
        .map(|cw| cw / intrinsic.width)
        .unwrap_or(f64::INFINITY);
    let by_height = container
        .finite_height()
        .map(|ch| ch / intrinsic.height)
        .unwrap_or(f64::INFINITY);

    by_width.min(by_height).min(1.0)
}
