// 该文件是 Yecao （野草） 项目的一部分。
// src/session.rs - 当前检测结果
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

use tracing::info;

use crate::{
  adapter::{AdapterError, DetectionAdapter},
  detection::DetectionResult,
  input::Media,
  model::Model,
};

/// 保存最近一次成功运行的结果
///
/// 运行完成后才替换结果；运行失败时保留之前的结果。
#[derive(Debug, Default)]
pub struct Session {
  current: Option<DetectionResult>,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> Option<&DetectionResult> {
    self.current.as_ref()
  }

  pub fn run<M: Model>(
    &mut self,
    adapter: &DetectionAdapter<M>,
    media: &Media,
  ) -> Result<&DetectionResult, AdapterError> {
    match media {
      Media::Image(path) => self.run_image(adapter, path),
      Media::Video(path) => self.run_video(adapter, path),
    }
  }

  pub fn run_image<M: Model>(
    &mut self,
    adapter: &DetectionAdapter<M>,
    path: &Path,
  ) -> Result<&DetectionResult, AdapterError> {
    let result = adapter.detect_image(path)?;
    Ok(self.publish(result))
  }

  pub fn run_video<M: Model>(
    &mut self,
    adapter: &DetectionAdapter<M>,
    path: &Path,
  ) -> Result<&DetectionResult, AdapterError> {
    let result = adapter.detect_video(path)?;
    Ok(self.publish(result))
  }

  pub fn clear(&mut self) {
    self.current = None;
  }

  fn publish(&mut self, result: DetectionResult) -> &DetectionResult {
    if let Some(previous) = &self.current {
      info!("替换之前的 {} 检测结果: {}", previous.kind(), previous.source().display());
    }
    self.current.insert(result)
  }
}
