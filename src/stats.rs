// 该文件是 Yecao （野草） 项目的一部分。
// src/stats.rs - 检测结果统计
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

//! 检测集合上的统计量。
//!
//! 所有操作都是对输入切片的纯函数。空集合不是错误：除 [`DetectionStats::count`]
//! 外，每个操作在空输入上返回 `None`，表示“没有数据”。

use serde::Serialize;

use crate::detection::Detection;

mod export;
pub use self::export::{ExportError, from_delimited_text};

pub const DEFAULT_BIN_COUNT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceSummary {
  pub mean: f64,
  pub median: f64,
  /// 样本标准差（n - 1），只有一条记录时为 `None`
  pub std_dev: Option<f64>,
  pub min: f64,
  pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaSummary {
  pub mean: f64,
  pub median: f64,
  pub min: f64,
  pub max: f64,
}

/// 直方图的一个区间 `[start, end)`，最后一个区间为 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
  pub start: f64,
  pub end: f64,
  pub count: usize,
}

/// 置信度分档
///
/// 区间左开右闭，最低档两端闭合：`[0, 0.3]`, `(0.3, 0.5]`, `(0.5, 0.7]`,
/// `(0.7, 0.9]`, `(0.9, 1.0]`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfidenceBucket {
  UpTo30,
  UpTo50,
  UpTo70,
  UpTo90,
  UpTo100,
}

impl ConfidenceBucket {
  pub const ALL: [ConfidenceBucket; 5] = [
    ConfidenceBucket::UpTo30,
    ConfidenceBucket::UpTo50,
    ConfidenceBucket::UpTo70,
    ConfidenceBucket::UpTo90,
    ConfidenceBucket::UpTo100,
  ];

  pub fn of(confidence: f32) -> Option<Self> {
    if !(0.0..=1.0).contains(&confidence) {
      return None;
    }
    Self::ALL
      .into_iter()
      .find(|bucket| confidence <= bucket.bounds().1)
  }

  pub fn bounds(&self) -> (f32, f32) {
    match self {
      ConfidenceBucket::UpTo30 => (0.0, 0.3),
      ConfidenceBucket::UpTo50 => (0.3, 0.5),
      ConfidenceBucket::UpTo70 => (0.5, 0.7),
      ConfidenceBucket::UpTo90 => (0.7, 0.9),
      ConfidenceBucket::UpTo100 => (0.9, 1.0),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      ConfidenceBucket::UpTo30 => "0-30%",
      ConfidenceBucket::UpTo50 => "30-50%",
      ConfidenceBucket::UpTo70 => "50-70%",
      ConfidenceBucket::UpTo90 => "70-90%",
      ConfidenceBucket::UpTo100 => "90-100%",
    }
  }
}

impl std::fmt::Display for ConfidenceBucket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.label())
  }
}

/// 展示用的一行检测数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
  pub rank: usize,
  pub confidence: f32,
  pub bbox: [f32; 4],
  pub bbox_area: f64,
}

impl TableRow {
  pub fn confidence_display(&self) -> String {
    format!("{:.2}%", self.confidence as f64 * 100.0)
  }

  pub fn bbox_display(&self) -> String {
    let [x1, y1, x2, y2] = self.bbox;
    format!("({:.0}, {:.0}, {:.0}, {:.0})", x1, y1, x2, y2)
  }

  pub fn area_display(&self) -> String {
    format!("{:.0}", self.bbox_area)
  }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionStats<'a> {
  detections: &'a [Detection],
}

impl<'a> DetectionStats<'a> {
  pub fn new(detections: &'a [Detection]) -> Self {
    Self { detections }
  }

  pub fn count(&self) -> usize {
    self.detections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  fn confidences(&self) -> Vec<f64> {
    self
      .detections
      .iter()
      .map(|d| d.confidence() as f64)
      .collect()
  }

  fn areas(&self) -> Vec<f64> {
    self.detections.iter().map(Detection::area).collect()
  }

  pub fn confidence_summary(&self) -> Option<ConfidenceSummary> {
    let values = self.confidences();
    let (min, max) = min_max(&values)?;
    Some(ConfidenceSummary {
      mean: mean(&values)?,
      median: median(&values)?,
      std_dev: sample_std_dev(&values),
      min,
      max,
    })
  }

  pub fn confidence_histogram(&self, bin_count: usize) -> Option<Vec<HistogramBin>> {
    histogram(&self.confidences(), bin_count)
  }

  /// 按原始顺序排列的 `(序号, 置信度)`，序号从 1 开始
  pub fn confidence_by_rank(&self) -> Option<Vec<(usize, f32)>> {
    if self.is_empty() {
      return None;
    }
    Some(
      self
        .detections
        .iter()
        .enumerate()
        .map(|(i, d)| (i + 1, d.confidence()))
        .collect(),
    )
  }

  /// 五个分档全部出现，按区间升序排列
  pub fn confidence_range_breakdown(&self) -> Option<Vec<(ConfidenceBucket, usize)>> {
    if self.is_empty() {
      return None;
    }
    let mut counts = ConfidenceBucket::ALL.map(|bucket| (bucket, 0usize));
    for detection in self.detections {
      // Detection 构造时已保证置信度在 [0, 1]
      if let Some(bucket) = ConfidenceBucket::of(detection.confidence()) {
        counts[bucket as usize].1 += 1;
      }
    }
    Some(counts.to_vec())
  }

  pub fn area_stats(&self) -> Option<AreaSummary> {
    let values = self.areas();
    let (min, max) = min_max(&values)?;
    Some(AreaSummary {
      mean: mean(&values)?,
      median: median(&values)?,
      min,
      max,
    })
  }

  pub fn area_histogram(&self, bin_count: usize) -> Option<Vec<HistogramBin>> {
    histogram(&self.areas(), bin_count)
  }

  pub fn to_table(&self) -> Option<Vec<TableRow>> {
    if self.is_empty() {
      return None;
    }
    Some(
      self
        .detections
        .iter()
        .enumerate()
        .map(|(i, d)| TableRow {
          rank: i + 1,
          confidence: d.confidence(),
          bbox: d.bbox(),
          bbox_area: d.area(),
        })
        .collect(),
    )
  }

  /// CSV 导出，列为 `confidence,bbox,bbox_area`，数值保持完整精度
  pub fn to_delimited_text(&self) -> Result<Option<Vec<u8>>, ExportError> {
    if self.is_empty() {
      return Ok(None);
    }
    export::to_delimited_text(self.detections).map(Some)
  }

  /// 与 [`to_delimited_text`](Self::to_delimited_text) 相同，空集合时只写表头
  pub fn to_delimited_document(&self) -> Result<Vec<u8>, ExportError> {
    export::to_delimited_text(self.detections)
  }
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
  } else {
    Some(sorted[mid])
  }
}

fn sample_std_dev(values: &[f64]) -> Option<f64> {
  if values.len() < 2 {
    return None;
  }
  let mean = mean(values)?;
  let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
  Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
  let first = *values.first()?;
  Some(
    values
      .iter()
      .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
  )
}

/// 在观测到的 `[min, max]` 上做等宽分箱
fn histogram(values: &[f64], bin_count: usize) -> Option<Vec<HistogramBin>> {
  let (min, max) = min_max(values)?;
  if max == min {
    return Some(vec![HistogramBin {
      start: min,
      end: max,
      count: values.len(),
    }]);
  }

  let bin_count = bin_count.max(1);
  let width = (max - min) / bin_count as f64;
  let mut bins: Vec<HistogramBin> = (0..bin_count)
    .map(|i| HistogramBin {
      start: min + width * i as f64,
      end: if i + 1 == bin_count {
        max
      } else {
        min + width * (i + 1) as f64
      },
      count: 0,
    })
    .collect();

  for v in values {
    let index = (((v - min) / width) as usize).min(bin_count - 1);
    bins[index].count += 1;
  }
  Some(bins)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(bbox: [f32; 4], confidence: f32) -> Detection {
    Detection::new(bbox, confidence).unwrap()
  }

  #[test]
  fn two_equal_area_detections() {
    let detections = vec![
      det([0.0, 0.0, 10.0, 10.0], 0.9),
      det([0.0, 0.0, 20.0, 5.0], 0.4),
    ];
    let stats = DetectionStats::new(&detections);

    assert_eq!(stats.count(), 2);
    assert_eq!(
      stats.area_stats(),
      Some(AreaSummary {
        mean: 100.0,
        median: 100.0,
        min: 100.0,
        max: 100.0,
      })
    );

    let summary = stats.confidence_summary().unwrap();
    assert!((summary.mean - 0.65).abs() < 1e-6);
    assert!((summary.median - 0.65).abs() < 1e-6);
    assert!((summary.min - 0.4).abs() < 1e-6);
    assert!((summary.max - 0.9).abs() < 1e-6);
    // 样本标准差: sqrt(((0.25)^2 * 2) / 1)
    assert!((summary.std_dev.unwrap() - 0.353_553_39).abs() < 1e-6);
  }

  #[test]
  fn empty_collection_reports_no_data() {
    let stats = DetectionStats::new(&[]);
    assert_eq!(stats.count(), 0);
    assert_eq!(stats.confidence_summary(), None);
    assert_eq!(stats.confidence_histogram(DEFAULT_BIN_COUNT), None);
    assert_eq!(stats.confidence_by_rank(), None);
    assert_eq!(stats.confidence_range_breakdown(), None);
    assert_eq!(stats.area_stats(), None);
    assert_eq!(stats.area_histogram(DEFAULT_BIN_COUNT), None);
    assert_eq!(stats.to_table(), None);
    assert_eq!(stats.to_delimited_text().unwrap(), None);

    let document = stats.to_delimited_document().unwrap();
    assert_eq!(String::from_utf8(document.clone()).unwrap(), "confidence,bbox,bbox_area\n");
    assert!(from_delimited_text(&document).unwrap().is_empty());
  }

  #[test]
  fn single_detection_lands_in_middle_bucket() {
    let detections = vec![det([0.0, 0.0, 4.0, 4.0], 0.55)];
    let stats = DetectionStats::new(&detections);

    let breakdown = stats.confidence_range_breakdown().unwrap();
    assert_eq!(breakdown.len(), 5);
    for (bucket, count) in breakdown {
      let expected = if bucket == ConfidenceBucket::UpTo70 { 1 } else { 0 };
      assert_eq!(count, expected, "{bucket}");
    }
    assert_eq!(stats.confidence_summary().unwrap().std_dev, None);
  }

  #[test]
  fn boundaries_belong_to_lower_bucket() {
    assert_eq!(ConfidenceBucket::of(0.0), Some(ConfidenceBucket::UpTo30));
    assert_eq!(ConfidenceBucket::of(0.3), Some(ConfidenceBucket::UpTo30));
    assert_eq!(ConfidenceBucket::of(0.300_001), Some(ConfidenceBucket::UpTo50));
    assert_eq!(ConfidenceBucket::of(0.5), Some(ConfidenceBucket::UpTo50));
    assert_eq!(ConfidenceBucket::of(0.7), Some(ConfidenceBucket::UpTo70));
    assert_eq!(ConfidenceBucket::of(0.9), Some(ConfidenceBucket::UpTo90));
    assert_eq!(ConfidenceBucket::of(1.0), Some(ConfidenceBucket::UpTo100));
    assert_eq!(ConfidenceBucket::of(1.01), None);
  }

  #[test]
  fn breakdown_sums_to_count() {
    let detections: Vec<_> = (0..=20)
      .map(|i| det([0.0, 0.0, 1.0, 1.0], i as f32 / 20.0))
      .collect();
    let stats = DetectionStats::new(&detections);
    let total: usize = stats
      .confidence_range_breakdown()
      .unwrap()
      .iter()
      .map(|(_, n)| n)
      .sum();
    assert_eq!(total, stats.count());
  }

  #[test]
  fn rank_preserves_input_order() {
    let detections = vec![
      det([0.0, 0.0, 1.0, 1.0], 0.3),
      det([0.0, 0.0, 1.0, 1.0], 0.9),
      det([0.0, 0.0, 1.0, 1.0], 0.5),
    ];
    let stats = DetectionStats::new(&detections);
    // 直方图内部排序不影响按序号的结果
    let _ = stats.confidence_histogram(4);
    let _ = stats.confidence_summary();
    assert_eq!(
      stats.confidence_by_rank().unwrap(),
      vec![(1, 0.3), (2, 0.9), (3, 0.5)]
    );
  }

  #[test]
  fn histogram_spans_observed_range() {
    let values = [0.0, 0.3, 0.35, 0.6, 1.0];
    let bins = histogram(&values, 4).unwrap();

    assert_eq!(bins.len(), 4);
    assert_eq!(bins[0].start, 0.0);
    assert_eq!(bins[1].start, 0.25);
    assert_eq!(bins[3].end, 1.0);
    let counts: Vec<_> = bins.iter().map(|b| b.count).collect();
    assert_eq!(counts, [1, 2, 1, 1]);
  }

  #[test]
  fn histogram_of_constant_values_is_one_bin() {
    let bins = histogram(&[0.5, 0.5, 0.5], DEFAULT_BIN_COUNT).unwrap();
    assert_eq!(
      bins,
      vec![HistogramBin {
        start: 0.5,
        end: 0.5,
        count: 3,
      }]
    );
    assert_eq!(histogram(&[0.1, 0.9], 0).unwrap().len(), 1);
  }

  #[test]
  fn median_of_odd_count_is_middle_value() {
    assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
  }

  #[test]
  fn table_rendering_rounds_to_pixels() {
    let detections = vec![det([1.4, 2.6, 10.2, 20.7], 0.876)];
    let row = &DetectionStats::new(&detections).to_table().unwrap()[0];
    assert_eq!(row.rank, 1);
    assert_eq!(row.bbox_display(), "(1, 3, 10, 21)");
    assert_eq!(row.confidence_display(), "87.60%");
  }
}
