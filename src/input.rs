// 该文件是 Yecao （野草） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, url_file_path};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod video_file;
pub use self::video_file::{FfmpegTools, RawFrameReader, VideoFileError, VideoFileInput, StreamInfo};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("不支持的文件类型: {0}")]
  UnsupportedExtension(String),
  #[error("URL 路径不是有效的 UTF-8: {0}")]
  InvalidPath(String),
}

/// 一次检测运行的输入媒体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
  Image(PathBuf),
  Video(PathBuf),
}

impl Media {
  /// 按扩展名识别本地文件
  pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, InputError> {
    let path = path.into();
    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_lowercase)
      .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
      Ok(Media::Image(path))
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
      Ok(Media::Video(path))
    } else {
      Err(InputError::UnsupportedExtension(path.display().to_string()))
    }
  }

  /// 接受 `image://`、`video://` URL 或本地文件路径
  pub fn parse(source: &str) -> Result<Self, InputError> {
    match url::Url::parse(source) {
      Ok(url) if url.scheme().len() > 1 => Self::from_url(&url),
      // 解析失败或形如 `C:\...` 的盘符都按本地路径处理
      _ => Self::from_path(source),
    }
  }

  pub fn path(&self) -> &Path {
    match self {
      Media::Image(path) | Media::Video(path) => path,
    }
  }
}

impl FromUrl for Media {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    let path = url_file_path(url).map_err(|_| InputError::InvalidPath(url.path().to_string()))?;
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(Media::Image(path)),
      VideoFileInput::SCHEME => Ok(Media::Video(path)),
      scheme => Err(InputError::SchemeMismatch(scheme.to_string())),
    }
  }
}
