// 该文件是 Yecao （野草） 项目的一部分。
// src/model.rs - 模型
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

use std::borrow::Cow;

use image::RgbImage;

/// 检测模型
///
/// 置信度阈值由调用方在每次推理时传入，模型只返回不低于阈值的结果。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, frame: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, frame: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    (**self).infer(frame, confidence)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 类别名称表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<String>);

impl Labels {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self(names.into_iter().map(Into::into).collect())
  }

  pub fn name(&self, class_id: u32) -> Cow<'_, str> {
    match self.0.get(class_id as usize) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(format!("class {}", class_id)),
    }
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

pub mod catalog;
pub use self::catalog::{CatalogError, ModelCatalog, ModelEntry};

#[cfg(feature = "model_yolov8")]
mod yolov8;
#[cfg(feature = "model_yolov8")]
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};
