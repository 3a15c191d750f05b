// 该文件是 Yecao （野草） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;
use tracing::debug;

use crate::{detection::Detection, model::Labels};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_COLOR: [u8; 3] = [46, 125, 50]; // 深绿色
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体加载错误: {0}")]
  FontLoadError(String),
}

/// 在图像上绘制检测框
///
/// 配置了字体时，在框的上方绘制 `<类别> <置信度>` 标签；否则只绘制边框。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  label_color: [u8; 3],
  labels: Labels,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      label_color: LABEL_COLOR,
      labels: Labels::default(),
    }
  }
}

impl Draw {
  pub fn with_font_file(self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| DrawError::FontLoadError(format!("{}: {}", path.display(), e)))?;
    debug!("加载标签字体: {}", path.display());
    Ok(self.with_font(font))
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.label_color = color;
    self
  }

  /// 返回绘制了检测框的副本
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections_on_image(&mut annotated, detections);
    annotated
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  // bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    let color = Rgb(self.label_color);
    let bbox = detection.bbox();

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for thickness in 0..BOX_THICKNESS {
      let x_min_t = (x_min + thickness).min(x_max);
      let y_min_t = (y_min + thickness).min(y_max);
      let x_max_t = (x_max - thickness).max(x_min_t);
      let y_max_t = (y_max - thickness).max(y_min_t);

      for x in x_min_t..=x_max_t {
        image.put_pixel(x as u32, y_min_t as u32, color);
        image.put_pixel(x as u32, y_max_t as u32, color);
      }
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t as u32, y as u32, color);
        image.put_pixel(x_max_t as u32, y as u32, color);
      }
    }

    let Some(font) = &self.font else {
      return;
    };

    let name = match detection.label() {
      Some(class_id) => self.labels.name(class_id).into_owned(),
      None => "object".to_string(),
    };
    let label = format!("{} {:.2}", name, detection.confidence());

    let scale = PxScale::from(self.font_size);
    let text_color = Rgb([255u8, 255u8, 255u8]);

    // 估算文本大小（粗略估计）
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签放在边框上方，放不下时贴着图像顶部
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);

    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = text_height.min(h - label_y).max(0) as u32;

    if label_width > 0 && label_height > 0 {
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        text_color,
        label_x,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        &label,
      );
    }
  }
}
