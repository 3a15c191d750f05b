// 该文件是 Yecao （野草） 项目的一部分。
// src/output/report.rs - 检测报告
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

//! 检测统计的终端文本报告与 JSON 报告

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::{
  detection::{Detection, DetectionResult},
  stats::{AreaSummary, ConfidenceSummary, DetectionStats, HistogramBin, TableRow},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedConfidence {
  pub rank: usize,
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
  pub range: &'static str,
  pub count: usize,
}

/// JSON 报告，每项统计在没有数据时为 `null`
#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub kind: String,
  pub source: PathBuf,
  pub output: Option<PathBuf>,
  pub frames: Option<usize>,
  pub rejected: usize,
  pub generated_at: String,
  pub count: usize,
  pub confidence: Option<ConfidenceSummary>,
  pub confidence_histogram: Option<Vec<HistogramBin>>,
  pub confidence_by_rank: Option<Vec<RankedConfidence>>,
  pub confidence_ranges: Option<Vec<BucketCount>>,
  pub area: Option<AreaSummary>,
  pub area_histogram: Option<Vec<HistogramBin>>,
  pub detections: Option<Vec<TableRow>>,
}

impl Report {
  pub fn from_result(result: &DetectionResult, bin_count: usize) -> Self {
    let stats = DetectionStats::new(result.detections());
    let (output, frames) = match result {
      DetectionResult::Image { .. } => (None, None),
      DetectionResult::Video { output, frames, .. } => (Some(output.clone()), Some(*frames)),
    };

    Report {
      kind: result.kind().to_string(),
      source: result.source().to_path_buf(),
      output,
      frames,
      rejected: result.rejected(),
      generated_at: Local::now().to_rfc3339(),
      count: stats.count(),
      confidence: stats.confidence_summary(),
      confidence_histogram: stats.confidence_histogram(bin_count),
      confidence_by_rank: stats.confidence_by_rank().map(|ranks| {
        ranks
          .into_iter()
          .map(|(rank, confidence)| RankedConfidence { rank, confidence })
          .collect()
      }),
      confidence_ranges: stats.confidence_range_breakdown().map(|buckets| {
        buckets
          .into_iter()
          .map(|(bucket, count)| BucketCount {
            range: bucket.label(),
            count,
          })
          .collect()
      }),
      area: stats.area_stats(),
      area_histogram: stats.area_histogram(bin_count),
      detections: stats.to_table(),
    }
  }

  /// 图片运行的标注图由调用方保存，在此记录其路径
  pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
    self.output = Some(output.into());
    self
  }

  pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, self)?;
    Ok(())
  }
}

fn percent(value: f64, decimals: usize) -> String {
  format!("{:.*}%", decimals, value * 100.0)
}

/// 打印统计文本报告；没有检测结果时只打印一行提示
pub fn print_text<W: Write>(
  out: &mut W,
  detections: &[Detection],
  show_table: bool,
  bin_count: usize,
) -> std::io::Result<()> {
  let stats = DetectionStats::new(detections);

  let Some(confidence) = stats.confidence_summary() else {
    writeln!(out, "未检测到目标，请尝试降低置信度阈值。")?;
    return Ok(());
  };

  writeln!(out, "检测总数: {}", stats.count())?;
  writeln!(out, "平均置信度: {}", percent(confidence.mean, 1))?;
  writeln!(out, "最高置信度: {}", percent(confidence.max, 1))?;
  writeln!(out, "最低置信度: {}", percent(confidence.min, 1))?;

  writeln!(out)?;
  writeln!(out, "置信度统计")?;
  writeln!(out, "  mean    {}", percent(confidence.mean, 2))?;
  writeln!(out, "  median  {}", percent(confidence.median, 2))?;
  match confidence.std_dev {
    Some(std_dev) => writeln!(out, "  std     {}", percent(std_dev, 2))?,
    None => writeln!(out, "  std     n/a")?,
  }
  writeln!(out, "  min     {}", percent(confidence.min, 2))?;
  writeln!(out, "  max     {}", percent(confidence.max, 2))?;

  if let Some(area) = stats.area_stats() {
    writeln!(out)?;
    writeln!(out, "边框面积统计 (像素)")?;
    writeln!(out, "  mean    {:.0}", area.mean)?;
    writeln!(out, "  median  {:.0}", area.median)?;
    writeln!(out, "  min     {:.0}", area.min)?;
    writeln!(out, "  max     {:.0}", area.max)?;
  }

  if let Some(buckets) = stats.confidence_range_breakdown() {
    writeln!(out)?;
    writeln!(out, "置信度区间分布")?;
    for (bucket, count) in buckets {
      writeln!(out, "  {:<8} {}", bucket.label(), count)?;
    }
  }

  if let Some(bins) = stats.confidence_histogram(bin_count) {
    writeln!(out)?;
    writeln!(out, "置信度直方图")?;
    write_histogram(out, &bins, |v| percent(v, 2))?;
  }

  if let Some(bins) = stats.area_histogram(bin_count) {
    writeln!(out)?;
    writeln!(out, "边框面积直方图")?;
    write_histogram(out, &bins, |v| format!("{:.0}", v))?;
  }

  if show_table && let Some(rows) = stats.to_table() {
    writeln!(out)?;
    writeln!(out, "检测明细")?;
    writeln!(out, "  {:>4}  {:>8}  {:<24}  {:>8}", "#", "置信度", "边框", "面积")?;
    for row in rows {
      writeln!(
        out,
        "  {:>4}  {:>8}  {:<24}  {:>8}",
        row.rank,
        row.confidence_display(),
        row.bbox_display(),
        row.area_display()
      )?;
    }
  }

  Ok(())
}

fn write_histogram<W: Write>(
  out: &mut W,
  bins: &[HistogramBin],
  format: impl Fn(f64) -> String,
) -> std::io::Result<()> {
  for (i, bin) in bins.iter().enumerate() {
    let close = if i + 1 == bins.len() { ']' } else { ')' };
    writeln!(
      out,
      "  [{}, {}{}  {}",
      format(bin.start),
      format(bin.end),
      close,
      bin.count
    )?;
  }
  Ok(())
}
