// 该文件是 Yecao （野草） 项目的一部分。
// tests/common/mod.rs - 测试用模型与辅助函数
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

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use yecao::{
  detection::Detection,
  model::{DetectItem, DetectResult, Model},
  output::Render,
};

#[derive(Debug, thiserror::Error)]
#[error("stub model failure")]
pub struct StubError;

/// 返回固定检测的模型，按传入阈值过滤并记录调用
pub struct StubModel {
  items: Vec<DetectItem>,
  pub calls: Cell<usize>,
  pub last_confidence: Cell<Option<f32>>,
}

impl StubModel {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items,
      calls: Cell::new(0),
      last_confidence: Cell::new(None),
    }
  }
}

impl Model for StubModel {
  type Error = StubError;

  fn infer(&self, _frame: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    self.calls.set(self.calls.get() + 1);
    self.last_confidence.set(Some(confidence));
    Ok(DetectResult::from(
      self
        .items
        .iter()
        .filter(|item| item.score >= confidence)
        .cloned()
        .collect::<Vec<_>>(),
    ))
  }
}

pub struct FailingModel;

impl Model for FailingModel {
  type Error = StubError;

  fn infer(&self, _frame: &RgbImage, _confidence: f32) -> Result<DetectResult, Self::Error> {
    Err(StubError)
  }
}

/// 以左上角像素的红色通道作为置信度，用来追踪帧顺序
pub struct PixelScoreModel;

impl Model for PixelScoreModel {
  type Error = StubError;

  fn infer(&self, frame: &RgbImage, _confidence: f32) -> Result<DetectResult, Self::Error> {
    let score = frame.get_pixel(0, 0)[0] as f32 / 255.0;
    Ok(DetectResult::from(vec![item(score, [0.0, 0.0, 0.5, 0.5])]))
  }
}

/// 在内存中记录每帧检测数的输出端
#[derive(Default)]
pub struct MemorySink {
  pub frames: RefCell<Vec<usize>>,
}

impl Render<RgbImage, [Detection]> for MemorySink {
  type Error = Infallible;

  fn render_result(&self, _frame: &RgbImage, result: &[Detection]) -> Result<(), Self::Error> {
    self.frames.borrow_mut().push(result.len());
    Ok(())
  }
}

pub fn item(score: f32, bbox: [f32; 4]) -> DetectItem {
  DetectItem {
    class_id: 0,
    score,
    bbox,
  }
}

/// 一个有效检测、一个反转边框、一个低于默认阈值的检测
pub fn field_items() -> Vec<DetectItem> {
  vec![
    item(0.9, [0.1, 0.1, 0.5, 0.5]),
    item(0.6, [0.1, 0.1, 0.05, 0.05]),
    item(0.1, [0.0, 0.0, 1.0, 1.0]),
  ]
}

pub fn solid_frame(width: u32, height: u32, value: u8) -> RgbImage {
  RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
  let path = dir.join(name);
  solid_frame(width, height, 0).save(&path).unwrap();
  path
}
