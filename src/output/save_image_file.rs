// 该文件是 Yecao （野草） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

pub struct SaveImageFileOutput {
  path: PathBuf,
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 按扩展名选择格式写出图像，必要时创建父目录
  pub fn save(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{detection::Detection, output::draw::Draw};

  #[test]
  fn annotated_png_is_written_with_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out/result.png");
    let output = SaveImageFileOutput::new(&path);

    let frame = RgbImage::new(20, 20);
    let detections = vec![Detection::new([2.0, 2.0, 10.0, 10.0], 0.7).unwrap()];
    let annotated = Draw::default()
      .with_color([255, 0, 0])
      .annotate(&frame, &detections);
    output.save(&annotated).unwrap();

    assert_eq!(output.path(), path.as_path());
    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (20, 20));
    assert_eq!(saved.get_pixel(2, 2), &image::Rgb([255, 0, 0]));
  }

  #[test]
  fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = SaveImageFileOutput::new(dir.path().join("result.unknownext"));
    assert!(matches!(
      output.save(&RgbImage::new(4, 4)),
      Err(SaveImageFileError::ImageError(_))
    ));
  }
}
