//! 诊断错误模块
//!
//! # 设计思路
//!
//! 图片加载失败最终要以“文档中的哪一行引用了哪张图、为什么失败”的形式呈现给作者。
//! `Diagnostic` 把底层 `ImageError` 与调用位置 `SourceSpan` 绑定在一起，
//! 既可直接打印，也可序列化为 JSON 交给编辑器或 CLI 输出。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息，`source()` 保留原始 `ImageError`。
//! - 使用 `serde::Serialize` 输出 `{ file, span, kind, code, path, message }`。
//! - 没有调用位置时（例如 CLI 直接加载），`file` 与 `span` 为 `null`。

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::image_handler::{ImageError, ImageErrorKind};

/// 文档中的字节区间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// 引用图片的调用位置：文档文件 + 区间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub span: Span,
}

impl SourceSpan {
    pub fn new(file: impl Into<PathBuf>, start: usize, end: usize) -> Self {
        Self {
            file: file.into(),
            span: Span { start, end },
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.file.display(), self.span.start, self.span.end)
    }
}

/// 带调用位置的图片诊断。
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{}{message}", location_prefix(.file, .span))]
pub struct Diagnostic {
    pub file: Option<PathBuf>,
    pub span: Option<Span>,
    pub kind: ImageErrorKind,
    pub code: &'static str,
    /// 出错的图片路径（内联来源为其标识）。
    pub path: PathBuf,
    pub message: String,
    #[serde(skip)]
    #[source]
    pub error: ImageError,
}

fn location_prefix(file: &Option<PathBuf>, span: &Option<Span>) -> String {
    match (file, span) {
        (Some(file), Some(span)) => format!("{}:{}..{}: ", file.display(), span.start, span.end),
        (Some(file), None) => format!("{}: ", file.display()),
        _ => String::new(),
    }
}

impl Diagnostic {
    pub fn new(error: ImageError, path: impl Into<PathBuf>, origin: Option<&SourceSpan>) -> Self {
        let kind = error.kind();
        Self {
            file: origin.map(|o| o.file.clone()),
            span: origin.map(|o| o.span),
            kind,
            code: kind.code(),
            path: path.into(),
            message: error.to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_call_site() {
        let err = ImageError::NotFound {
            path: PathBuf::from("/doc/missing.png"),
        };
        let origin = SourceSpan::new("/doc/main.typ", 10, 32);
        let diagnostic = Diagnostic::new(err, "/doc/missing.png", Some(&origin));

        let text = diagnostic.to_string();
        assert!(text.starts_with("/doc/main.typ:10..32: file not found"));
        assert_eq!(diagnostic.kind, ImageErrorKind::NotFound);
    }

    #[test]
    fn serializes_without_origin() {
        let err = ImageError::ResourceLimit("too big".to_string());
        let diagnostic = Diagnostic::new(err, "inline", None);

        let json = serde_json::to_value(&diagnostic).expect("serialize diagnostic");
        assert_eq!(json["file"], serde_json::Value::Null);
        assert_eq!(json["kind"], "resource_limit");
        assert_eq!(json["code"], "E_RESOURCE_LIMIT");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn serializes_span() {
        let err = ImageError::Internal("x".to_string());
        let origin = SourceSpan::new("a.typ", 1, 2);
        let json = serde_json::to_value(Diagnostic::new(err, "p.png", Some(&origin)))
            .expect("serialize diagnostic");

        assert_eq!(json["span"]["start"], 1);
        assert_eq!(json["span"]["end"], 2);
        assert_eq!(json["file"], "a.typ");
    }
}
