// 该文件是 Yecao （野草） 项目的一部分。
// src/detection.rs - 检测记录与检测结果
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::warn;

use crate::model::{DetectItem, DetectResult};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedDetection {
  #[error("边框坐标反转: ({0}, {1}, {2}, {3})")]
  InvertedBox(f32, f32, f32, f32),
  #[error("边框坐标不是有限值")]
  NonFiniteBox,
  #[error("置信度 {0} 不在 [0, 1] 范围内")]
  ConfidenceOutOfRange(f32),
}

/// 一条检测记录，边框为源帧像素坐标 `(x1, y1, x2, y2)`
///
/// 构造时即校验 `x1 <= x2`、`y1 <= y2` 与置信度范围，之后不可修改。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  bbox: [f32; 4],
  confidence: f32,
  label: Option<u32>,
}

impl Detection {
  pub fn new(bbox: [f32; 4], confidence: f32) -> Result<Self, MalformedDetection> {
    let [x1, y1, x2, y2] = bbox;
    if !bbox.iter().all(|v| v.is_finite()) {
      return Err(MalformedDetection::NonFiniteBox);
    }
    if x1 > x2 || y1 > y2 {
      return Err(MalformedDetection::InvertedBox(x1, y1, x2, y2));
    }
    if !(0.0..=1.0).contains(&confidence) {
      return Err(MalformedDetection::ConfidenceOutOfRange(confidence));
    }
    Ok(Self {
      bbox,
      confidence,
      label: None,
    })
  }

  pub fn with_label(mut self, class_id: u32) -> Self {
    self.label = Some(class_id);
    self
  }

  /// 将归一化坐标的模型输出换算到 `width x height` 像素坐标
  pub fn from_item(item: &DetectItem, width: u32, height: u32) -> Result<Self, MalformedDetection> {
    let (w, h) = (width as f32, height as f32);
    let [x1, y1, x2, y2] = item.bbox;
    Detection::new([x1 * w, y1 * h, x2 * w, y2 * h], item.score).map(|d| d.with_label(item.class_id))
  }

  pub fn bbox(&self) -> [f32; 4] {
    self.bbox
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn label(&self) -> Option<u32> {
    self.label
  }

  pub fn area(&self) -> f64 {
    let [x1, y1, x2, y2] = self.bbox;
    (x2 as f64 - x1 as f64) * (y2 as f64 - y1 as f64)
  }
}

/// 一帧检测输出的规范化结果
#[derive(Debug, Clone, Default)]
pub struct Normalized {
  pub detections: Vec<Detection>,
  pub rejected: usize,
}

/// 规范化模型输出，无效记录被丢弃并计数
pub fn normalize(result: &DetectResult, width: u32, height: u32) -> Normalized {
  let mut normalized = Normalized {
    detections: Vec::with_capacity(result.len()),
    rejected: 0,
  };
  for item in result.items.iter() {
    match Detection::from_item(item, width, height) {
      Ok(detection) => normalized.detections.push(detection),
      Err(e) => {
        warn!("丢弃无效检测记录 {:?}: {}", item, e);
        normalized.rejected += 1;
      }
    }
  }
  normalized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
  Image,
  Video,
}

impl std::fmt::Display for ResultKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResultKind::Image => write!(f, "image"),
      ResultKind::Video => write!(f, "video"),
    }
  }
}

/// 一次检测运行的完整结果
#[derive(Debug, Clone)]
pub enum DetectionResult {
  Image {
    source: PathBuf,
    original: RgbImage,
    annotated: RgbImage,
    detections: Vec<Detection>,
    rejected: usize,
  },
  Video {
    input: PathBuf,
    output: PathBuf,
    frames: usize,
    detections: Vec<Detection>,
    rejected: usize,
  },
}

impl DetectionResult {
  pub fn kind(&self) -> ResultKind {
    match self {
      DetectionResult::Image { .. } => ResultKind::Image,
      DetectionResult::Video { .. } => ResultKind::Video,
    }
  }

  /// 图片的检测集合，或视频所有帧按顺序汇总的检测集合
  pub fn detections(&self) -> &[Detection] {
    match self {
      DetectionResult::Image { detections, .. } | DetectionResult::Video { detections, .. } => {
        detections
      }
    }
  }

  pub fn rejected(&self) -> usize {
    match self {
      DetectionResult::Image { rejected, .. } | DetectionResult::Video { rejected, .. } => *rejected,
    }
  }

  pub fn source(&self) -> &std::path::Path {
    match self {
      DetectionResult::Image { source, .. } => source,
      DetectionResult::Video { input, .. } => input,
    }
  }
}
