//! # 文档图片嵌入 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            排版层 / CLI（image-embed 可执行文件）          │
//! │                                                          │
//! │   ImageRequest { source, directive, container, origin }  │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓ Result<SizedImage, Diagnostic>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓                                                  │
//! │  ┌─ error ────── Diagnostic (错误 + 调用位置)              │
//! │  │                                                       │
//! │  ├─ image_handler                                        │
//! │  │   ├─ service   ImageSession（每次构建一个）            │
//! │  │   ├─ handler   ImageLoader 编排 + 阶段耗时             │
//! │  │   ├─ cache     内容指纹缓存 + 并发合并                 │
//! │  │   ├─ sniff     文件头识别                              │
//! │  │   └─ decoder   PNG / JPEG / SVG 注册表                 │
//! │  │                                                       │
//! │  └─ sizing ───── 固有尺寸 + 指令 + 容器 → RenderBox        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | `Diagnostic`：把 `ImageError` 绑定到文档中的引用位置，可序列化 |
//! | [`image_handler`] | 读取、嗅探、解码、缓存图片，并给出渲染框 |
//! | [`sizing`] | 纯几何计算：按指令与容器确定图片的渲染尺寸（单位：点） |

pub mod error;
pub mod image_handler;
pub mod sizing;
