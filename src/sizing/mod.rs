//! 图片尺寸解析模块
//!
//! # 设计思路
//!
//! 将“固有尺寸 + 显式宽高指令 + 可用容器空间 → 渲染框”的计算独立为纯几何模块，
//! 不依赖解码、缓存或 I/O，便于穷举测试与属性测试。
//!
//! # 模块结构
//!
//! | 文件 | 职责 |
//! |------|------|
//! | `mod.rs` | 公共类型：`Size`、`SizingDirective`、`ContainerRegion`、`RenderBox` |
//! | `calculation.rs` | 核心算法 `resolve` |
//!
//! 所有长度单位均为点（pt）。

mod calculation;

use serde::{Deserialize, Serialize};

pub use calculation::resolve;

/// 二维尺寸（点）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// 文档层给出的尺寸指令。
///
/// - 都未给出：使用固有尺寸，必要时按容器等比缩小
/// - 都给出：强制拉伸到该尺寸，放弃原宽高比
/// - 只给一边：另一边按固有宽高比推算
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SizingDirective {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl SizingDirective {
    pub const fn natural() -> Self {
        Self {
            width: None,
            height: None,
        }
    }

    pub const fn width(width: f64) -> Self {
        Self {
            width: Some(width),
            height: None,
        }
    }

    pub const fn height(height: f64) -> Self {
        Self {
            width: None,
            height: Some(height),
        }
    }

    pub const fn exact(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// 给出的每一边都是有限的非负值。
    pub fn is_valid(&self) -> bool {
        let valid = |v: Option<f64>| v.is_none_or(|v| v.is_finite() && v >= 0.0);
        valid(self.width) && valid(self.height)
    }
}

/// 排版层提供的可用空间；`None` 或非有限值表示该轴不受限。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRegion {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ContainerRegion {
    pub const fn unbounded() -> Self {
        Self {
            width: None,
            height: None,
        }
    }

    pub const fn bounded(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// 有限的可用宽度；负值收敛为 0。
    pub fn finite_width(&self) -> Option<f64> {
        finite_extent(self.width)
    }

    /// 有限的可用高度；负值收敛为 0。
    pub fn finite_height(&self) -> Option<f64> {
        finite_extent(self.height)
    }
}

fn finite_extent(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.max(0.0))
}

/// 最终渲染框，以及相对固有尺寸的缩放比例。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderBox {
    pub width: f64,
    pub height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl RenderBox {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// 两轴缩放比例一致时返回该比例。
    pub fn scale(&self) -> Option<f64> {
        if (self.scale_x - self.scale_y).abs() <= f64::EPSILON * self.scale_x.abs().max(1.0) {
            Some(self.scale_x)
        } else {
            None
        }
    }

    /// 是否被显式宽高拉伸（两轴比例不一致）。
    pub fn is_stretched(&self) -> bool {
        self.scale().is_none()
    }
}
