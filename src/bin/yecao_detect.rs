// 该文件是 Yecao （野草） 项目的一部分。
// src/bin/yecao_detect.rs - 图像/视频杂草检测
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use url::Url;

use yecao::{
  FromUrl,
  adapter::{DEFAULT_CONFIDENCE, DetectionAdapter},
  detection::DetectionResult,
  input::{FfmpegTools, Media},
  model::{Labels, ModelCatalog, Yolov8Builder},
  output::{
    SaveImageFileOutput,
    draw::Draw,
    report::{self, Report},
  },
  session::Session,
  stats::{DEFAULT_BIN_COUNT, DetectionStats},
};

const SAMPLE_IMAGE: &str = "sample_image.png";

/// Yecao 检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URL，如 yolov8:///models/best.onnx?size=640
  #[arg(long, value_name = "MODEL", conflicts_with = "catalog")]
  pub model: Option<Url>,
  /// 模型目录文件 (TOML)
  #[arg(long, value_name = "CATALOG")]
  pub catalog: Option<PathBuf>,
  /// 目录中的模型名称，默认使用第一个
  #[arg(long, value_name = "NAME", requires = "catalog")]
  pub variant: Option<String>,
  /// 列出目录中的模型后退出
  #[arg(long, requires = "catalog")]
  pub list_models: bool,
  /// 输入来源：image:// 或 video:// URL，或本地文件路径
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<String>,
  /// 置信度阈值 (0, 1]
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
  pub confidence: f32,
  /// NMS IoU 阈值，默认 0.45
  #[arg(long)]
  pub nms_threshold: Option<f32>,
  /// 标注图像与视频的输出目录
  #[arg(long, default_value = "output")]
  pub output_dir: PathBuf,
  /// 标签字体文件 (TTF/OTF)
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 检测框颜色，十六进制 RRGGBB
  #[arg(long, value_name = "RRGGBB", value_parser = parse_color)]
  pub color: Option<[u8; 3]>,
  /// ffmpeg 可执行文件
  #[arg(long, default_value = "ffmpeg")]
  pub ffmpeg: PathBuf,
  /// ffprobe 可执行文件
  #[arg(long, default_value = "ffprobe")]
  pub ffprobe: PathBuf,
  /// 导出检测数据 CSV
  #[arg(long, value_name = "CSV")]
  pub csv: Option<PathBuf>,
  /// 导出 JSON 报告
  #[arg(long, value_name = "JSON")]
  pub report: Option<PathBuf>,
  /// 打印检测明细表
  #[arg(long)]
  pub table: bool,
  /// 直方图分箱数
  #[arg(long, default_value_t = DEFAULT_BIN_COUNT)]
  pub bins: usize,
}

fn parse_color(raw: &str) -> Result<[u8; 3], String> {
  let hex = raw.trim_start_matches('#');
  if hex.len() != 6 || !hex.is_ascii() {
    return Err(format!("颜色应为 RRGGBB: {}", raw));
  }
  let channel = |i: usize| {
    u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("颜色应为 RRGGBB: {} ({})", raw, e))
  };
  Ok([channel(0)?, channel(2)?, channel(4)?])
}

fn list_models(catalog: &ModelCatalog) -> Result<()> {
  let mut out = std::io::stdout().lock();
  for entry in catalog.iter() {
    writeln!(out, "{} ({})", entry.name, entry.kind)?;
    if !entry.description.is_empty() {
      writeln!(out, "  {}", entry.description)?;
    }
    writeln!(out, "  权重: {}", entry.path.display())?;
    if let Some(notebook) = &entry.notebook {
      writeln!(out, "  训练笔记: {}", notebook)?;
    }
  }
  Ok(())
}

/// 返回模型 URL 与类别名称
fn select_model(args: &Args) -> Result<(Url, Labels)> {
  if let Some(url) = &args.model {
    return Ok((url.clone(), Labels::default()));
  }

  let Some(catalog_path) = &args.catalog else {
    bail!("需要指定 --model 或 --catalog");
  };
  let catalog = ModelCatalog::load(catalog_path)
    .with_context(|| format!("无法读取模型目录 {}", catalog_path.display()))?;

  let entry = match &args.variant {
    Some(name) => catalog.get(name)?,
    None => catalog
      .iter()
      .next()
      .with_context(|| format!("模型目录 {} 为空", catalog_path.display()))?,
  };
  info!("使用模型 {}: {}", entry.name, entry.description);
  Ok((entry.to_url()?, entry.labels()))
}

fn select_input(input: Option<&str>) -> Result<Media> {
  match input {
    Some(source) => Ok(Media::parse(source)?),
    None if Path::new(SAMPLE_IMAGE).exists() => {
      info!("未指定输入，使用示例图像 {}", SAMPLE_IMAGE);
      Ok(Media::Image(PathBuf::from(SAMPLE_IMAGE)))
    }
    None => bail!("未指定 --input，且当前目录下没有 {}", SAMPLE_IMAGE),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  if args.list_models
    && let Some(catalog_path) = &args.catalog
  {
    let catalog = ModelCatalog::load(catalog_path)
      .with_context(|| format!("无法读取模型目录 {}", catalog_path.display()))?;
    return list_models(&catalog);
  }

  let (model_url, labels) = select_model(&args)?;
  let media = select_input(args.input.as_deref())?;

  info!("模型: {}", model_url);
  info!("输入来源: {}", media.path().display());
  info!("输出目录: {}", args.output_dir.display());

  let mut builder = Yolov8Builder::from_url(&model_url)?;
  if let Some(nms) = args.nms_threshold {
    builder = builder.nms_threshold(nms);
  }
  let model = builder.build()?;

  let mut draw = Draw::default().with_labels(labels);
  if let Some(font) = &args.font {
    draw = draw.with_font_file(font)?;
  }
  if let Some(color) = args.color {
    draw = draw.with_color(color);
  }

  let adapter = DetectionAdapter::new(model, args.confidence)?
    .with_output_dir(&args.output_dir)
    .with_draw(draw)
    .with_tools(FfmpegTools {
      ffmpeg: args.ffmpeg.clone(),
      ffprobe: args.ffprobe.clone(),
    });

  let mut session = Session::new();
  let now = std::time::Instant::now();
  let result = session.run(&adapter, &media).context("检测失败")?;
  info!("检测完成，耗时: {:.2?}", now.elapsed());

  let mut json_report = Report::from_result(result, args.bins);
  match result {
    DetectionResult::Image {
      source, annotated, ..
    } => {
      let path = adapter.output_path(source, "png");
      SaveImageFileOutput::new(&path)
        .save(annotated)
        .context("保存标注图像失败")?;
      json_report = json_report.with_output(&path);
    }
    DetectionResult::Video { output, frames, .. } => {
      info!("标注视频: {} ({} 帧)", output.display(), frames);
    }
  }

  {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{} 检测结果: {}", result.kind(), result.source().display())?;
    if result.rejected() > 0 {
      writeln!(out, "丢弃无效检测记录: {}", result.rejected())?;
    }
    report::print_text(&mut out, result.detections(), args.table, args.bins)?;
  }

  if let Some(csv_path) = &args.csv {
    // 没有检测结果时仍写出表头
    let data = DetectionStats::new(result.detections()).to_delimited_document()?;
    std::fs::write(csv_path, data).with_context(|| format!("无法写入 {}", csv_path.display()))?;
    info!("检测数据已导出到 {}", csv_path.display());
  }

  if let Some(report_path) = &args.report {
    json_report
      .write_json(report_path)
      .with_context(|| format!("无法写入 {}", report_path.display()))?;
    info!("报告已保存到 {}", report_path.display());
  }

  Ok(())
}
