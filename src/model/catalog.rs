// 该文件是 Yecao （野草） 项目的一部分。
// src/model/catalog.rs - 模型目录
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

//! 可选模型的目录，使用 TOML 描述：
//!
//! ```toml
//! [[model]]
//! name = "YOLOv8n"
//! kind = "yolov8"
//! description = "轻量模型"
//! path = "models/yolov8n.onnx"
//! input_size = 640
//! labels = ["weed"]
//! notebook = "https://www.kaggle.com/code/example/yolov8n-weeds"
//! ```
//!
//! 相对路径以目录文件所在位置为基准。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::model::Labels;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录格式错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("模型名称重复: {0}")]
  DuplicateName(String),
  #[error("未知模型 '{name}'，可用模型: {available}")]
  UnknownModel { name: String, available: String },
  #[error("无法将模型路径转换为 URL: {0}")]
  InvalidPath(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelEntry {
  pub name: String,
  pub kind: String,
  #[serde(default)]
  pub description: String,
  pub path: PathBuf,
  pub input_size: Option<u32>,
  #[serde(default)]
  pub labels: Vec<String>,
  pub notebook: Option<String>,
}

impl ModelEntry {
  pub fn labels(&self) -> Labels {
    Labels::new(self.labels.iter().cloned())
  }

  /// 转换为 `<kind>://<path>?size=<input_size>` 形式的模型 URL
  pub fn to_url(&self) -> Result<Url, CatalogError> {
    let absolute = std::path::absolute(&self.path)?;
    let file_url = Url::from_file_path(&absolute)
      .map_err(|_| CatalogError::InvalidPath(self.path.display().to_string()))?;
    // file 是特殊方案，不能直接 set_scheme 为模型类型
    let mut url = Url::parse(&format!("{}://{}", self.kind, file_url.path()))
      .map_err(|_| CatalogError::InvalidPath(format!("无效的模型类型: {}", self.kind)))?;
    if let Some(size) = self.input_size {
      url.query_pairs_mut().append_pair("size", &size.to_string());
    }
    Ok(url)
  }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
  #[serde(default)]
  model: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
  models: Vec<ModelEntry>,
}

impl ModelCatalog {
  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    let content = std::fs::read_to_string(path)?;
    let mut catalog = Self::parse(&content)?;

    let base = path.parent().unwrap_or(Path::new(""));
    for entry in catalog.models.iter_mut() {
      if entry.path.is_relative() {
        entry.path = base.join(&entry.path);
      }
    }
    info!("从 {} 读取到 {} 个模型", path.display(), catalog.len());
    Ok(catalog)
  }

  pub fn parse(content: &str) -> Result<Self, CatalogError> {
    let file: CatalogFile = toml::from_str(content)?;

    let mut seen = HashSet::new();
    for entry in &file.model {
      if !seen.insert(entry.name.as_str()) {
        return Err(CatalogError::DuplicateName(entry.name.clone()));
      }
    }

    Ok(Self { models: file.model })
  }

  pub fn get(&self, name: &str) -> Result<&ModelEntry, CatalogError> {
    self
      .models
      .iter()
      .find(|entry| entry.name == name)
      .ok_or_else(|| CatalogError::UnknownModel {
        name: name.to_string(),
        available: self
          .models
          .iter()
          .map(|entry| entry.name.as_str())
          .collect::<Vec<_>>()
          .join(", "),
      })
  }

  pub fn iter(&self) -> impl Iterator<Item = &ModelEntry> {
    self.models.iter()
  }

  pub fn len(&self) -> usize {
    self.models.len()
  }

  pub fn is_empty(&self) -> bool {
    self.models.is_empty()
  }
}
