//! # 文档图片嵌入 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 加载逻辑分布在库的各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use image_embed::error::Diagnostic;
use image_embed::image_handler::{
    CacheStats, ImageConfig, ImageFormat, ImageRequest, ImageSession, Resolution, SourceReference,
};
use image_embed::sizing::{ContainerRegion, RenderBox, SizingDirective};

/// 加载一张图片，输出其固有尺寸与渲染框（JSON）。
#[derive(Debug, Parser)]
#[command(name = "image-embed", version, about)]
struct Cli {
    /// 图片路径
    path: PathBuf,

    /// 指定渲染宽度（点）
    #[arg(long, value_parser = parse_extent)]
    width: Option<f64>,

    /// 指定渲染高度（点）
    #[arg(long, value_parser = parse_extent)]
    height: Option<f64>,

    /// 可用区域宽度（点），缺省为不限
    #[arg(long)]
    container_width: Option<f64>,

    /// 可用区域高度（点），缺省为不限
    #[arg(long)]
    container_height: Option<f64>,

    /// JSON 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 重复加载次数，用于观察缓存命中
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

#[derive(Debug, Serialize)]
struct Report {
    path: PathBuf,
    format: ImageFormat,
    intrinsic_width: f64,
    intrinsic_height: f64,
    pixel_size: Option<(u32, u32)>,
    dpi: Option<Resolution>,
    render_box: RenderBox,
    cache: CacheStats,
}

/// 显式宽高必须是有限的非负数。
fn parse_extent(value: &str) -> Result<f64, String> {
    let extent: f64 = value.parse().map_err(|e| format!("invalid number: {e}"))?;
    if !extent.is_finite() || extent < 0.0 {
        return Err(format!("expected a finite non-negative length, got {value}"));
    }
    Ok(extent)
}

fn run(cli: Cli) -> Result<Report, Diagnostic> {
    let path = cli.path.clone();
    let to_diagnostic = |error| Diagnostic::new(error, path.clone(), None);

    let config = match &cli.config {
        Some(config_path) => ImageConfig::load_from_path(config_path).map_err(to_diagnostic)?,
        None => ImageConfig::default(),
    };
    let session = ImageSession::with_config(config).map_err(to_diagnostic)?;

    let request = ImageRequest::new(SourceReference::path(&cli.path))
        .with_directive(SizingDirective {
            width: cli.width,
            height: cli.height,
        })
        .with_container(ContainerRegion {
            width: cli.container_width,
            height: cli.container_height,
        });

    let mut placed = session.place(&request)?;
    for _ in 1..cli.repeat {
        placed = session.place(&request)?;
    }

    Ok(Report {
        path: cli.path,
        format: placed.image.format(),
        intrinsic_width: placed.image.width(),
        intrinsic_height: placed.image.height(),
        pixel_size: placed.image.pixel_size(),
        dpi: placed.image.dpi(),
        render_box: placed.render_box,
        cache: session.cache_stats(),
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("❌ 输出序列化失败: {e}");
                ExitCode::FAILURE
            }
        },
        Err(diagnostic) => {
            match serde_json::to_string_pretty(&diagnostic) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{diagnostic}"),
            }
            ExitCode::FAILURE
        }
    }
}
