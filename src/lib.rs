// 该文件是 Yecao （野草） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod adapter;
pub mod detection;
pub mod input;
pub mod model;
pub mod output;
pub mod session;
pub mod stats;

use std::path::PathBuf;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// URL 路径部分解码为本地路径，`%20` 与非 ASCII 字符还原为原文
pub fn url_file_path(url: &url::Url) -> Result<PathBuf, std::string::FromUtf8Error> {
  urlencoding::decode(url.path()).map(|path| PathBuf::from(path.into_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("image:///data/drone run/野草.png").unwrap();
    assert_eq!(
      url_file_path(&url).unwrap(),
      PathBuf::from("/data/drone run/野草.png")
    );

    let url = url::Url::parse("video:///data/%FF.mp4").unwrap();
    assert!(url_file_path(&url).is_err());
  }
}
