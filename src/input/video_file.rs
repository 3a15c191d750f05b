// 该文件是 Yecao （野草） 项目的一部分。
// src/input/video_file.rs - 视频文件输入
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

//! 视频文件输入模块
//!
//! 通过 `ffprobe` 读取视频流的尺寸、旋转与帧率，再由 `ffmpeg` 将视频解码为
//! RGB24 原始帧，经管道逐帧读取。
//!
//! # URL 格式
//!
//! - `video:///path/to/input.mp4`
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具，路径可通过
//! [`FfmpegTools`] 指定。

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_file_path};

const DEFAULT_FRAME_RATE: &str = "25";
const RGB_CHANNELS: usize = 3;
// 只保留 ffmpeg 错误输出的末尾部分
const STDERR_TAIL_LIMIT: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum VideoFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("URL 路径无效: {0}")]
  InvalidPath(String),
  #[error("无法执行 {0} (请确保已安装): {1}")]
  ToolMissing(String, std::io::Error),
  #[error("ffprobe 失败: {0}")]
  ProbeFailed(String),
  #[error("视频中没有可用的视频流")]
  NoVideoStream,
  #[error("ffmpeg 解码失败: {0}")]
  DecodeFailed(String),
  #[error("第 {index} 帧数据不完整: 期望 {expected} 字节, 实际 {actual} 字节")]
  TruncatedFrame {
    index: u64,
    expected: usize,
    actual: usize,
  },
}

/// ffmpeg 与 ffprobe 可执行文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
  pub ffmpeg: PathBuf,
  pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
  fn default() -> Self {
    Self {
      ffmpeg: PathBuf::from("ffmpeg"),
      ffprobe: PathBuf::from("ffprobe"),
    }
  }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
  #[serde(default)]
  streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
  width: Option<u32>,
  height: Option<u32>,
  avg_frame_rate: Option<String>,
  r_frame_rate: Option<String>,
  #[serde(default)]
  side_data_list: Vec<FfprobeSideData>,
  #[serde(default)]
  tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
  rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
  rotate: Option<String>,
}

impl FfprobeStream {
  // 新版 ffprobe 写在显示矩阵中，旧版写在 rotate 标签中
  fn rotation(&self) -> i32 {
    self
      .side_data_list
      .iter()
      .find_map(|side| side.rotation)
      .or_else(|| self.tags.rotate.as_deref()?.trim().parse().ok())
      .map_or(0, |r: f64| r.round() as i32)
  }
}

/// 视频流参数
///
/// `width` 与 `height` 是 ffmpeg 自动旋转之后解码帧的尺寸。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  /// 显示旋转角度（度）
  pub rotation: i32,
  /// ffmpeg 的有理数帧率写法，如 `30000/1001`
  pub frame_rate: String,
}

impl StreamInfo {
  pub fn run(tools: &FfmpegTools, path: &Path) -> Result<Self, VideoFileError> {
    let output = Command::new(&tools.ffprobe)
      .args(["-v", "error", "-select_streams", "v:0"])
      .args([
        "-show_entries",
        "stream=width,height,avg_frame_rate,r_frame_rate:stream_side_data=rotation:stream_tags=rotate",
      ])
      .args(["-print_format", "json"])
      .arg(path)
      .stdin(Stdio::null())
      .output()
      .map_err(|e| VideoFileError::ToolMissing(tools.ffprobe.display().to_string(), e))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      error!("ffprobe 错误: {}", stderr);
      return Err(VideoFileError::ProbeFailed(stderr.trim().to_string()));
    }

    Self::parse(&output.stdout)
  }

  pub fn parse(json: &[u8]) -> Result<Self, VideoFileError> {
    let output: FfprobeOutput =
      serde_json::from_slice(json).map_err(|e| VideoFileError::ProbeFailed(e.to_string()))?;
    let stream = output
      .streams
      .into_iter()
      .next()
      .ok_or(VideoFileError::NoVideoStream)?;

    let (coded_width, coded_height) = match (stream.width, stream.height) {
      (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
      _ => return Err(VideoFileError::NoVideoStream),
    };

    let rotation = stream.rotation();
    let (width, height) = if rotation.rem_euclid(180) == 90 {
      debug!("视频旋转 {} 度，解码尺寸为 {}x{}", rotation, coded_height, coded_width);
      (coded_height, coded_width)
    } else {
      (coded_width, coded_height)
    };

    let frame_rate = [stream.avg_frame_rate, stream.r_frame_rate]
      .into_iter()
      .flatten()
      .find(|rate| parse_rate(rate).is_some())
      .unwrap_or_else(|| {
        warn!("无法读取视频帧率，使用默认值 {}", DEFAULT_FRAME_RATE);
        DEFAULT_FRAME_RATE.to_string()
      });

    Ok(StreamInfo {
      width,
      height,
      rotation,
      frame_rate,
    })
  }

  pub fn fps(&self) -> f64 {
    parse_rate(&self.frame_rate).unwrap_or(25.0)
  }
}

/// 解析 `n/d` 或整数帧率，非正值视为无效
fn parse_rate(rate: &str) -> Option<f64> {
  let value = match rate.split_once('/') {
    Some((n, d)) => {
      let n: f64 = n.trim().parse().ok()?;
      let d: f64 = d.trim().parse().ok()?;
      if d == 0.0 {
        return None;
      }
      n / d
    }
    None => rate.trim().parse().ok()?,
  };
  (value.is_finite() && value > 0.0).then_some(value)
}

/// 从 RGB24 原始字节流中逐帧读取固定尺寸的图像
pub struct RawFrameReader<R> {
  reader: R,
  width: u32,
  height: u32,
  index: u64,
}

impl<R: Read> RawFrameReader<R> {
  pub fn new(reader: R, width: u32, height: u32) -> Self {
    Self {
      reader,
      width,
      height,
      index: 0,
    }
  }

  /// 已读取的完整帧数
  pub fn frames_read(&self) -> u64 {
    self.index
  }

  /// 流在帧边界结束时返回 `Ok(None)`，在帧中间结束时返回 `TruncatedFrame`
  pub fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoFileError> {
    let expected = self.width as usize * self.height as usize * RGB_CHANNELS;
    let mut buffer = vec![0u8; expected];
    let mut filled = 0;
    while filled < expected {
      match self.reader.read(&mut buffer[filled..]) {
        Ok(0) => break,
        Ok(n) => filled += n,
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e.into()),
      }
    }

    if filled == 0 {
      return Ok(None);
    }
    if filled < expected {
      return Err(VideoFileError::TruncatedFrame {
        index: self.index,
        expected,
        actual: filled,
      });
    }

    let frame = RgbImage::from_raw(self.width, self.height, buffer)
      .ok_or_else(|| VideoFileError::DecodeFailed("无法创建 RGB 图像".to_string()))?;
    self.index += 1;
    Ok(Some(frame))
  }
}

// 在后台线程持续读取 stderr，避免管道写满后 ffmpeg 阻塞
fn drain_stderr(mut pipe: ChildStderr) -> std::io::Result<JoinHandle<String>> {
  std::thread::Builder::new()
    .name("ffmpeg-stderr".to_string())
    .spawn(move || {
      let mut tail = Vec::new();
      let mut chunk = [0u8; 4096];
      loop {
        match pipe.read(&mut chunk) {
          Ok(0) => break,
          Ok(n) => {
            tail.extend_from_slice(&chunk[..n]);
            if tail.len() > STDERR_TAIL_LIMIT {
              let excess = tail.len() - STDERR_TAIL_LIMIT;
              tail.drain(..excess);
            }
          }
          Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
          Err(_) => break,
        }
      }
      String::from_utf8_lossy(&tail).into_owned()
    })
}

/// 根据解码器退出状态决定读取结果
///
/// 解码器失败时优先报告其错误输出，其次才是帧不完整等读取错误。
fn settle_decoder(
  status: ExitStatus,
  stderr: &str,
  read_error: Option<VideoFileError>,
) -> Result<(), VideoFileError> {
  if !status.success() {
    error!("ffmpeg 错误: {}", stderr);
    return Err(VideoFileError::DecodeFailed(format!(
      "{} ({})",
      stderr.trim(),
      status
    )));
  }
  if !stderr.trim().is_empty() {
    debug!("ffmpeg 输出: {}", stderr.trim());
  }
  match read_error {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

/// 视频文件输入，按显示顺序迭代解码后的 RGB 帧
pub struct VideoFileInput {
  path: PathBuf,
  info: StreamInfo,
  child: Child,
  frames: RawFrameReader<ChildStdout>,
  stderr: Option<JoinHandle<String>>,
  finished: bool,
}

impl FromUrlWithScheme for VideoFileInput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for VideoFileInput {
  type Error = VideoFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(VideoFileError::SchemeMismatch(format!(
        "期望输入方式 '{}', 实际输入方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    let path =
      url_file_path(url).map_err(|_| VideoFileError::InvalidPath(url.path().to_string()))?;
    Self::open(path)
  }
}

impl VideoFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoFileError> {
    Self::open_with(&FfmpegTools::default(), path)
  }

  pub fn open_with(tools: &FfmpegTools, path: impl AsRef<Path>) -> Result<Self, VideoFileError> {
    let path = path.as_ref();
    let info = StreamInfo::run(tools, path)?;
    info!(
      "打开视频 {}: {}x{} @ {:.2} fps",
      path.display(),
      info.width,
      info.height,
      info.fps()
    );

    let mut child = Command::new(&tools.ffmpeg)
      .args(["-loglevel", "error", "-nostdin"])
      .arg("-i")
      .arg(path)
      .args(["-map", "0:v:0"])
      .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
      .arg("-")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| VideoFileError::ToolMissing(tools.ffmpeg.display().to_string(), e))?;

    let pipes = match (child.stdout.take(), child.stderr.take()) {
      (Some(stdout), Some(stderr)) => drain_stderr(stderr).map(|handle| (stdout, handle)),
      _ => Err(std::io::Error::other("无法读取 ffmpeg 输出")),
    };
    let (stdout, stderr) = match pipes {
      Ok(pipes) => pipes,
      Err(e) => {
        let _ = child.kill();
        let _ = child.wait();
        return Err(VideoFileError::DecodeFailed(e.to_string()));
      }
    };

    Ok(Self {
      path: path.to_path_buf(),
      frames: RawFrameReader::new(stdout, info.width, info.height),
      info,
      child,
      stderr: Some(stderr),
      finished: false,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn stream_info(&self) -> &StreamInfo {
    &self.info
  }

  fn read_frame(&mut self) -> Result<Option<RgbImage>, VideoFileError> {
    match self.frames.read_frame() {
      Ok(Some(frame)) => Ok(Some(frame)),
      Ok(None) => {
        self.wait_decoder(None)?;
        debug!("视频解码结束，共 {} 帧", self.frames.frames_read());
        Ok(None)
      }
      Err(e) => {
        self.wait_decoder(Some(e))?;
        Ok(None)
      }
    }
  }

  fn wait_decoder(&mut self, read_error: Option<VideoFileError>) -> Result<(), VideoFileError> {
    if let Some(VideoFileError::IoError(_)) = &read_error {
      // 管道读取失败时解码器可能仍在写出，先结束它再回收
      let _ = self.child.kill();
    }
    let status = self.child.wait()?;
    let stderr = self
      .stderr
      .take()
      .and_then(|handle| handle.join().ok())
      .unwrap_or_default();
    settle_decoder(status, &stderr, read_error)
  }
}

impl Iterator for VideoFileInput {
  type Item = Result<RgbImage, VideoFileError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.read_frame() {
      Ok(Some(frame)) => Some(Ok(frame)),
      Ok(None) => {
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

impl Drop for VideoFileInput {
  fn drop(&mut self) {
    if let Ok(None) = self.child.try_wait() {
      let _ = self.child.kill();
      let _ = self.child.wait();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn first_stream_is_used() {
    let json = br#"{"streams":[{"width":1280,"height":720,"avg_frame_rate":"30000/1001","r_frame_rate":"30/1"}]}"#;
    let info = StreamInfo::parse(json).unwrap();
    assert_eq!(info.width, 1280);
    assert_eq!(info.height, 720);
    assert_eq!(info.rotation, 0);
    assert_eq!(info.frame_rate, "30000/1001");
    assert!((info.fps() - 29.97).abs() < 0.01);
  }

  #[test]
  fn rotated_stream_swaps_decoded_size() {
    let json = br#"{"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30/1",
      "side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
    let info = StreamInfo::parse(json).unwrap();
    assert_eq!((info.width, info.height), (1080, 1920));
    assert_eq!(info.rotation, -90);

    let json = br#"{"streams":[{"width":1920,"height":1080,"tags":{"rotate":"270"}}]}"#;
    let info = StreamInfo::parse(json).unwrap();
    assert_eq!((info.width, info.height), (1080, 1920));

    let json = br#"{"streams":[{"width":1920,"height":1080,"side_data_list":[{"rotation":180}]}]}"#;
    let info = StreamInfo::parse(json).unwrap();
    assert_eq!((info.width, info.height), (1920, 1080));
  }

  #[test]
  fn unknown_average_rate_falls_back() {
    let json = br#"{"streams":[{"width":64,"height":48,"avg_frame_rate":"0/0","r_frame_rate":"24/1"}]}"#;
    assert_eq!(StreamInfo::parse(json).unwrap().frame_rate, "24/1");

    let json = br#"{"streams":[{"width":64,"height":48}]}"#;
    assert_eq!(StreamInfo::parse(json).unwrap().frame_rate, DEFAULT_FRAME_RATE);
  }

  #[test]
  fn missing_video_stream_fails() {
    assert!(matches!(
      StreamInfo::parse(br#"{"streams":[]}"#),
      Err(VideoFileError::NoVideoStream)
    ));
    assert!(matches!(
      StreamInfo::parse(br#"{}"#),
      Err(VideoFileError::NoVideoStream)
    ));
    assert!(matches!(
      StreamInfo::parse(b"not json"),
      Err(VideoFileError::ProbeFailed(_))
    ));
  }

  #[test]
  fn rate_parsing() {
    assert_eq!(parse_rate("25"), Some(25.0));
    assert_eq!(parse_rate("50/2"), Some(25.0));
    assert_eq!(parse_rate("0/0"), None);
    assert_eq!(parse_rate("abc"), None);
  }

  #[test]
  fn raw_frames_are_read_in_order() {
    let mut data = vec![10u8; 12];
    data.extend(vec![20u8; 12]);
    let mut reader = RawFrameReader::new(Cursor::new(data), 2, 2);

    let first = reader.read_frame().unwrap().unwrap();
    assert_eq!(first.dimensions(), (2, 2));
    assert_eq!(first.get_pixel(1, 1), &image::Rgb([10, 10, 10]));
    let second = reader.read_frame().unwrap().unwrap();
    assert_eq!(second.get_pixel(0, 0), &image::Rgb([20, 20, 20]));
    assert!(reader.read_frame().unwrap().is_none());
    assert_eq!(reader.frames_read(), 2);
  }

  #[test]
  fn empty_stream_has_no_frames() {
    let mut reader = RawFrameReader::new(Cursor::new(Vec::new()), 4, 4);
    assert!(reader.read_frame().unwrap().is_none());
    assert_eq!(reader.frames_read(), 0);
  }

  #[test]
  fn partial_frame_is_truncated() {
    let mut reader = RawFrameReader::new(Cursor::new(vec![0u8; 12 + 5]), 2, 2);
    assert!(reader.read_frame().unwrap().is_some());
    assert!(matches!(
      reader.read_frame(),
      Err(VideoFileError::TruncatedFrame {
        index: 1,
        expected: 12,
        actual: 5,
      })
    ));
  }

  #[cfg(unix)]
  #[test]
  fn decoder_failure_takes_precedence() {
    use std::os::unix::process::ExitStatusExt;

    let failed = ExitStatus::from_raw(1 << 8);
    let truncated = VideoFileError::TruncatedFrame {
      index: 0,
      expected: 12,
      actual: 3,
    };
    assert!(matches!(
      settle_decoder(failed, "Invalid data found", Some(truncated)),
      Err(VideoFileError::DecodeFailed(msg)) if msg.contains("Invalid data found")
    ));

    let ok = ExitStatus::from_raw(0);
    assert!(settle_decoder(ok, "", None).is_ok());
    assert!(matches!(
      settle_decoder(
        ok,
        "",
        Some(VideoFileError::TruncatedFrame {
          index: 2,
          expected: 12,
          actual: 3,
        })
      ),
      Err(VideoFileError::TruncatedFrame { index: 2, .. })
    ));
  }
}
