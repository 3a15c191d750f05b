// 该文件是 Yecao （野草） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Model},
  url_file_path,
};

const YOLOV8_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLOV8_DEFAULT_NMS_THRESH: f32 = 0.45;
const YOLOV8_BOX_ROWS: usize = 4;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出无效: {0}")]
  OutputInvalid(String),
}

pub struct Yolov8Builder {
  model_path: PathBuf,
  input_size: u32,
  nms_threshold: f32,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = url_file_path(url)
      .map_err(|_| Yolov8Error::ModelPathError(format!("URL 路径无效: {}", url.path())))?;
    let mut builder = Yolov8Builder::new(path);
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "size" => {
          builder.input_size = v
            .parse()
            .map_err(|_| Yolov8Error::ModelPathError(format!("无效的输入尺寸: {}", v)))?;
        }
        "nms" => {
          builder.nms_threshold = v
            .parse()
            .map_err(|_| Yolov8Error::ModelPathError(format!("无效的 NMS 阈值: {}", v)))?;
        }
        _ => {}
      }
    }
    Ok(builder)
  }
}

impl Yolov8Builder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: YOLOV8_DEFAULT_INPUT_SIZE,
      nms_threshold: YOLOV8_DEFAULT_NMS_THRESH,
    }
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    if self.input_size == 0 {
      return Err(Yolov8Error::ModelPathError("输入尺寸不能为 0".to_string()));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let size = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| Yolov8Error::ModelLoadError(format!("{}: {}", self.model_path.display(), e)))?;
    info!("模型加载完成");
    debug!(
      "模型输入尺寸: {}x{}, NMS 阈值: {}",
      self.input_size, self.input_size, self.nms_threshold
    );

    Ok(Yolov8 {
      plan,
      input_size: self.input_size,
      nms_threshold: self.nms_threshold,
    })
  }
}

pub struct Yolov8 {
  plan: Plan,
  input_size: u32,
  nms_threshold: f32,
}

impl Yolov8 {
  fn preprocess(&self, frame: &RgbImage) -> Tensor {
    let size = self.input_size;
    let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
    let size = size as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
      resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
    .into_tensor()
  }
}

impl Model for Yolov8 {
  type Error = Yolov8Error;

  fn infer(&self, frame: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    debug!("设置模型输入");
    let input = self.preprocess(frame);

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(input.into()))
      .map_err(|e| Yolov8Error::InferenceError(e.to_string()))?;

    let output = outputs
      .first()
      .ok_or_else(|| Yolov8Error::OutputInvalid("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| Yolov8Error::OutputInvalid(e.to_string()))?;
    let shape = view.shape().to_vec();
    debug!("模型输出形状: {:?}", shape);

    let (rows, anchors) = match shape.as_slice() {
      [1, rows, anchors] if *rows > YOLOV8_BOX_ROWS => (*rows, *anchors),
      _ => {
        return Err(Yolov8Error::OutputInvalid(format!(
          "期望输出形状为 [1, 4 + 类别数, N]，实际为 {:?}",
          shape
        )));
      }
    };
    let data: Vec<f32> = view.iter().copied().collect();

    let items = decode_output(
      &data,
      rows,
      anchors,
      self.input_size as f32,
      confidence,
      self.nms_threshold,
    );
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

/// 解码 `[4 + 类别数, N]` 的输出，返回归一化坐标的检测结果
fn decode_output(
  data: &[f32],
  rows: usize,
  anchors: usize,
  input_size: f32,
  confidence: f32,
  nms_threshold: f32,
) -> Vec<DetectItem> {
  let num_classes = rows - YOLOV8_BOX_ROWS;
  let at = |row: usize, anchor: usize| data[row * anchors + anchor];

  let mut items = Vec::new();
  for i in 0..anchors {
    let (mut score, mut class_id) = (f32::MIN, 0usize);
    for c in 0..num_classes {
      let s = at(YOLOV8_BOX_ROWS + c, i);
      if s > score {
        score = s;
        class_id = c;
      }
    }

    if score < confidence {
      continue;
    }

    let cx = at(0, i);
    let cy = at(1, i);
    let w = at(2, i);
    let h = at(3, i);

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [
        ((cx - w / 2.0) / input_size).clamp(0.0, 1.0),
        ((cy - h / 2.0) / input_size).clamp(0.0, 1.0),
        ((cx + w / 2.0) / input_size).clamp(0.0, 1.0),
        ((cy + h / 2.0) / input_size).clamp(0.0, 1.0),
      ],
    });
  }

  nms(items, nms_threshold)
}

/// 非极大值抑制（按类别）
fn nms(mut items: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == item.class_id && iou(&kept.bbox, &item.bbox) > threshold);
    if !suppressed {
      result.push(item);
    }
  }
  result
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  // 两个锚点、两个类别：行依次为 cx, cy, w, h, cls0, cls1
  fn two_anchor_output(scores: [[f32; 2]; 2]) -> Vec<f32> {
    vec![
      320.0, 160.0, // cx
      320.0, 160.0, // cy
      64.0, 32.0, // w
      64.0, 32.0, // h
      scores[0][0], scores[1][0], // cls0
      scores[0][1], scores[1][1], // cls1
    ]
  }

  #[test]
  fn decode_keeps_best_class_above_threshold() {
    let data = two_anchor_output([[0.1, 0.8], [0.2, 0.1]]);
    let items = decode_output(&data, 6, 2, 640.0, 0.25, 0.45);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
    assert!((items[0].score - 0.8).abs() < 1e-6);
    let expected = [288.0 / 640.0, 288.0 / 640.0, 352.0 / 640.0, 352.0 / 640.0];
    for (got, want) in items[0].bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-6);
    }
  }

  #[test]
  fn decode_clamps_boxes_to_frame() {
    let data = vec![0.0, 0.0, 100.0, 100.0, 0.9];
    let items = decode_output(&data, 5, 1, 640.0, 0.5, 0.45);
    assert_eq!(items[0].bbox[0], 0.0);
    assert_eq!(items[0].bbox[1], 0.0);
  }

  #[test]
  fn nms_suppresses_overlapping_same_class() {
    let a = DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: [0.0, 0.0, 0.5, 0.5],
    };
    let b = DetectItem {
      score: 0.7,
      bbox: [0.01, 0.01, 0.5, 0.5],
      ..a.clone()
    };
    let c = DetectItem {
      class_id: 1,
      ..b.clone()
    };
    let kept = nms(vec![b, a.clone(), c], 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0], a);
    assert_eq!(kept[1].class_id, 1);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 0.1, 0.1], &[0.5, 0.5, 0.6, 0.6]), 0.0);
  }

  #[test]
  fn url_query_overrides_defaults() {
    let url = Url::parse("yolov8:///models/weed.onnx?size=320&nms=0.5").unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/weed.onnx"));
    assert_eq!(builder.input_size, 320);
    assert_eq!(builder.nms_threshold, 0.5);

    let url = Url::parse("yolov8:///data/%E9%87%8E%E8%8D%89%20%E6%A8%A1%E5%9E%8B/best.onnx").unwrap();
    assert_eq!(
      Yolov8Builder::from_url(&url).unwrap().model_path,
      PathBuf::from("/data/野草 模型/best.onnx")
    );

    let url = Url::parse("onnx:///models/weed.onnx").unwrap();
    assert!(Yolov8Builder::from_url(&url).is_err());
  }
}
