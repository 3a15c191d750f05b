// 该文件是 Yecao （野草） 项目的一部分。
// src/adapter.rs - 检测适配器
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

//! 在单张图片或视频的每一帧上调用模型，并把原始输出规范化为检测集合。
//!
//! 置信度阈值在构造时校验，之后原样交给模型；适配器自身不再按置信度过滤。

use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  detection::{Detection, DetectionResult, Normalized, normalize},
  input::{FfmpegTools, ImageFileInput, ImageFileInputError, VideoFileError, VideoFileInput},
  model::Model,
  output::{Render, SaveVideoFileOutput, draw::Draw},
};

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("图像解码失败: {0}")]
  Image(#[from] ImageFileInputError),
  #[error("视频解码失败: {0}")]
  Video(#[from] VideoFileError),
  #[error("视频没有可解码的帧: {0}")]
  EmptyVideo(PathBuf),
}

#[derive(Error, Debug)]
pub enum AdapterError {
  #[error("解码阶段失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("推理阶段失败: {0}")]
  ModelInvocation(#[source] Box<dyn StdError + Send + Sync>),
  #[error("编码阶段失败: {0}")]
  Encode(#[source] Box<dyn StdError + Send + Sync>),
  #[error("置信度阈值 {0} 不在 (0, 1] 范围内")]
  InvalidThreshold(f32),
}

/// 多帧检测的汇总，检测按帧顺序、帧内顺序排列
#[derive(Debug, Clone, Default)]
pub struct PooledDetections {
  pub frames: usize,
  pub detections: Vec<Detection>,
  pub rejected: usize,
}

pub struct DetectionAdapter<M: Model> {
  model: M,
  confidence: f32,
  output_dir: PathBuf,
  draw: Draw,
  tools: FfmpegTools,
}

impl<M: Model> DetectionAdapter<M> {
  pub fn new(model: M, confidence: f32) -> Result<Self, AdapterError> {
    // NaN 也在这里被拒绝
    if !(confidence > 0.0 && confidence <= 1.0) {
      return Err(AdapterError::InvalidThreshold(confidence));
    }
    Ok(Self {
      model,
      confidence,
      output_dir: std::env::temp_dir(),
      draw: Draw::default(),
      tools: FfmpegTools::default(),
    })
  }

  /// 标注视频的输出目录
  pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
    self.output_dir = output_dir.into();
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 视频解码与编码使用的 ffmpeg/ffprobe
  pub fn with_tools(mut self, tools: FfmpegTools) -> Self {
    self.tools = tools;
    self
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// `<output_dir>/<source stem>_detected.<extension>`
  pub fn output_path(&self, source: &Path, extension: &str) -> PathBuf {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "output".to_string());
    self
      .output_dir
      .join(format!("{}_detected.{}", stem, extension))
  }

  fn infer(&self, frame: &RgbImage) -> Result<Normalized, AdapterError> {
    let raw = self
      .model
      .infer(frame, self.confidence)
      .map_err(|e| AdapterError::ModelInvocation(Box::new(e)))?;
    debug!("模型返回 {} 个原始检测", raw.len());
    Ok(normalize(&raw, frame.width(), frame.height()))
  }

  pub fn detect_image(&self, path: &Path) -> Result<DetectionResult, AdapterError> {
    info!("检测图像: {}", path.display());
    let original = ImageFileInput::open(path)
      .map_err(DecodeError::from)?
      .into_image();

    let Normalized {
      detections,
      rejected,
    } = self.infer(&original)?;
    let annotated = self.draw.annotate(&original, &detections);
    info!("检测到 {} 个目标，丢弃 {} 个无效记录", detections.len(), rejected);

    Ok(DetectionResult::Image {
      source: path.to_path_buf(),
      original,
      annotated,
      detections,
      rejected,
    })
  }

  /// 逐帧检测并把绘制后的帧交给 `sink`，任何一帧失败都会中止
  pub fn detect_frames<I, E, R>(&self, frames: I, sink: &R) -> Result<PooledDetections, AdapterError>
  where
    I: IntoIterator<Item = Result<RgbImage, E>>,
    E: Into<DecodeError>,
    R: Render<RgbImage, [Detection]>,
    R::Error: StdError + Send + Sync + 'static,
  {
    let mut pooled = PooledDetections::default();
    for frame in frames {
      let frame = frame.map_err(|e| AdapterError::Decode(e.into()))?;
      let Normalized {
        detections,
        rejected,
      } = self.infer(&frame)?;

      sink
        .render_result(&frame, &detections)
        .map_err(|e| AdapterError::Encode(Box::new(e)))?;

      debug!("第 {} 帧: {} 个目标", pooled.frames, detections.len());
      pooled.frames += 1;
      pooled.rejected += rejected;
      pooled.detections.extend(detections);
    }
    Ok(pooled)
  }

  pub fn detect_video(&self, path: &Path) -> Result<DetectionResult, AdapterError> {
    info!("检测视频: {}", path.display());
    let input = VideoFileInput::open_with(&self.tools, path).map_err(DecodeError::from)?;
    let output_path = self.output_path(path, "mp4");
    let sink = SaveVideoFileOutput::new(&output_path, input.stream_info().frame_rate.clone())
      .with_tools(&self.tools)
      .with_draw(self.draw.clone());

    let pooled = self.detect_frames(input, &sink)?;
    if pooled.frames == 0 {
      return Err(DecodeError::EmptyVideo(path.to_path_buf()).into());
    }

    sink
      .finish()
      .map_err(|e| AdapterError::Encode(Box::new(e)))?;
    info!(
      "处理 {} 帧，检测到 {} 个目标，输出: {}",
      pooled.frames,
      pooled.detections.len(),
      output_path.display()
    );

    Ok(DetectionResult::Video {
      input: path.to_path_buf(),
      output: output_path,
      frames: pooled.frames,
      detections: pooled.detections,
      rejected: pooled.rejected,
    })
  }
}
