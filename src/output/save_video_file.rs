// 该文件是 Yecao （野草） 项目的一部分。
// src/output/save_video_file.rs - 保存视频文件
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

//! 视频文件输出模块
//!
//! 每一帧绘制检测框后以 PNG 写入临时目录，调用 [`SaveVideoFileOutput::finish`]
//! 时由 ffmpeg 编码为 H.264 MP4。编码失败时不会留下不完整的视频文件。
//!
//! H.264 的 yuv420p 要求宽高为偶数，奇数尺寸的帧在编码时补齐一行或一列。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::RgbImage;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  detection::Detection,
  input::FfmpegTools,
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum SaveVideoFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("视频编码错误: {0}")]
  EncodingError(String),
  #[error("第 {index} 帧尺寸 {actual:?} 与首帧 {expected:?} 不一致")]
  FrameSizeMismatch {
    index: usize,
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("没有可编码的帧")]
  NoFrames,
}

// 宽高向上补齐为偶数
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// 视频帧缓存
struct FrameBuffer {
  temp_dir: TempDir,
  frames: usize,
  dimensions: Option<(u32, u32)>,
}

impl FrameBuffer {
  fn new() -> Result<Self, SaveVideoFileError> {
    let temp_dir = tempfile::Builder::new().prefix("yecao-frames-").tempdir()?;
    debug!("视频帧临时目录: {}", temp_dir.path().display());

    Ok(FrameBuffer {
      temp_dir,
      frames: 0,
      dimensions: None,
    })
  }

  fn add_frame(&mut self, image: &RgbImage) -> Result<(), SaveVideoFileError> {
    let actual = image.dimensions();
    match self.dimensions {
      None => self.dimensions = Some(actual),
      Some(expected) if expected != actual => {
        return Err(SaveVideoFileError::FrameSizeMismatch {
          index: self.frames,
          expected,
          actual,
        });
      }
      Some(_) => {}
    }

    let frame_path = self
      .temp_dir
      .path()
      .join(format!("frame_{:06}.png", self.frames));
    image.save(&frame_path)?;
    self.frames += 1;

    Ok(())
  }

  fn encode_args(&self, output_path: &Path, frame_rate: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
      "-y", // 覆盖已存在的文件
      "-loglevel",
      "error",
      "-nostdin",
      "-framerate",
      frame_rate,
      "-i",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(self.temp_dir.path().join("frame_%06d.png").into_os_string());
    args.extend(
      [
        "-vf",
        EVEN_PAD_FILTER,
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-preset",
        "fast",
        "-crf",
        "23", // 质量参数（0-51，越小质量越好）
      ]
      .into_iter()
      .map(OsString::from),
    );
    args.push(output_path.as_os_str().to_os_string());
    args
  }

  fn encode_to_video(
    &self,
    ffmpeg: &Path,
    output_path: &Path,
    frame_rate: &str,
  ) -> Result<(), SaveVideoFileError> {
    info!(
      "开始编码视频: {} 帧 @ {} fps -> {}",
      self.frames,
      frame_rate,
      output_path.display()
    );

    if let Some(parent) = output_path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let output = Command::new(ffmpeg)
      .args(self.encode_args(output_path, frame_rate))
      .stdin(Stdio::null())
      .output()
      .map_err(|e| {
        error!("无法执行 {}: {}", ffmpeg.display(), e);
        SaveVideoFileError::EncodingError(format!(
          "无法执行 {} (请确保已安装): {}",
          ffmpeg.display(),
          e
        ))
      })?;

    if output.status.success() {
      info!("视频编码成功: {}", output_path.display());
      Ok(())
    } else {
      let stderr = String::from_utf8_lossy(&output.stderr);
      error!("ffmpeg 错误: {}", stderr);
      Err(SaveVideoFileError::EncodingError(format!(
        "ffmpeg 失败: {} ({})",
        stderr.trim(),
        output.status
      )))
    }
  }
}

pub struct SaveVideoFileOutput {
  path: PathBuf,
  frame_rate: String,
  ffmpeg: PathBuf,
  draw: Draw,
  buffer: RefCell<Option<FrameBuffer>>,
}

impl SaveVideoFileOutput {
  /// `frame_rate` 使用 ffmpeg 的写法，整数或 `n/d`
  pub fn new(path: impl Into<PathBuf>, frame_rate: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      frame_rate: frame_rate.into(),
      ffmpeg: FfmpegTools::default().ffmpeg,
      draw: Draw::default(),
      buffer: RefCell::new(None),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_tools(mut self, tools: &FfmpegTools) -> Self {
    self.ffmpeg = tools.ffmpeg.clone();
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn frame_rate(&self) -> &str {
    &self.frame_rate
  }

  pub fn frame_count(&self) -> usize {
    self.buffer.borrow().as_ref().map_or(0, |b| b.frames)
  }

  fn push_frame(&self, image: &RgbImage) -> Result<(), SaveVideoFileError> {
    let mut buffer_opt = self.buffer.borrow_mut();
    if buffer_opt.is_none() {
      *buffer_opt = Some(FrameBuffer::new()?);
      info!("初始化视频帧缓冲区: {}", self.path.display());
    }
    match buffer_opt.as_mut() {
      Some(buffer) => buffer.add_frame(image),
      None => Ok(()),
    }
  }

  /// 编码所有已渲染的帧，返回帧数
  ///
  /// 失败时删除可能已部分写出的目标文件。临时帧目录总是被清理。
  pub fn finish(self) -> Result<usize, SaveVideoFileError> {
    let buffer = match self.buffer.into_inner() {
      Some(buffer) if buffer.frames > 0 => buffer,
      _ => return Err(SaveVideoFileError::NoFrames),
    };

    match buffer.encode_to_video(&self.ffmpeg, &self.path, &self.frame_rate) {
      Ok(()) => Ok(buffer.frames),
      Err(e) => {
        if self.path.exists()
          && let Err(remove_err) = std::fs::remove_file(&self.path)
        {
          warn!("删除不完整的视频文件失败: {}", remove_err);
        }
        Err(e)
      }
    }
  }
}

impl Render<RgbImage, [Detection]> for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn render_result(&self, frame: &RgbImage, result: &[Detection]) -> Result<(), Self::Error> {
    self.push_frame(&self.draw.annotate(frame, result))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_are_buffered_as_numbered_png() {
    let output = SaveVideoFileOutput::new("/tmp/unused.mp4", "25");
    let frame = RgbImage::new(8, 8);
    output.render_result(&frame, &[]).unwrap();
    output.render_result(&frame, &[]).unwrap();
    assert_eq!(output.frame_count(), 2);

    let buffer = output.buffer.borrow();
    let dir = buffer.as_ref().unwrap().temp_dir.path().to_path_buf();
    assert!(dir.join("frame_000000.png").exists());
    assert!(dir.join("frame_000001.png").exists());
  }

  #[test]
  fn frame_size_must_stay_constant() {
    let output = SaveVideoFileOutput::new("/tmp/unused.mp4", "25");
    output.render_result(&RgbImage::new(8, 8), &[]).unwrap();
    assert!(matches!(
      output.render_result(&RgbImage::new(4, 8), &[]),
      Err(SaveVideoFileError::FrameSizeMismatch { index: 1, .. })
    ));
  }

  #[test]
  fn finishing_without_frames_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.mp4");
    let output = SaveVideoFileOutput::new(&path, "25");
    assert!(matches!(output.finish(), Err(SaveVideoFileError::NoFrames)));
    assert!(!path.exists());
  }

  #[test]
  fn odd_sized_frames_are_padded_to_even() {
    let output = SaveVideoFileOutput::new("/tmp/odd.mp4", "30000/1001");
    output.render_result(&RgbImage::new(7, 5), &[]).unwrap();

    let buffer = output.buffer.borrow();
    let args = buffer
      .as_ref()
      .unwrap()
      .encode_args(Path::new("/tmp/odd.mp4"), "30000/1001");
    let args: Vec<String> = args
      .iter()
      .map(|arg| arg.to_string_lossy().into_owned())
      .collect();

    let filter = args.iter().position(|arg| arg == "-vf").unwrap();
    assert_eq!(args[filter + 1], EVEN_PAD_FILTER);
    let rate = args.iter().position(|arg| arg == "-framerate").unwrap();
    assert_eq!(args[rate + 1], "30000/1001");
    assert!(args[rate + 3].ends_with("frame_%06d.png"));
    // 滤镜位于输入之后、输出之前
    assert!(filter > rate + 3);
    assert_eq!(args.last().unwrap(), "/tmp/odd.mp4");
  }
}
