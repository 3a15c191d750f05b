// 该文件是 Yecao （野草） 项目的一部分。
// src/stats/export.rs - 检测数据 CSV 导出与读取
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

use csv::{ReaderBuilder, Writer};
use thiserror::Error;

use crate::detection::{Detection, MalformedDetection};

const HEADER: [&str; 3] = ["confidence", "bbox", "bbox_area"];
// 面积在导出时保持完整精度，读取时与坐标重新计算的面积比较
const AREA_TOLERANCE: f64 = 1e-3;

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("CSV 错误: {0}")]
  CsvError(#[from] csv::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("表头不匹配: 期望 '{expected}', 实际 '{0}'", expected = HEADER.join(","))]
  HeaderMismatch(String),
  #[error("第 {row} 行字段 {field} 无法解析: '{value}'")]
  FieldError {
    row: usize,
    field: &'static str,
    value: String,
  },
  #[error("第 {row} 行面积 {area} 与边框不一致")]
  AreaMismatch { row: usize, area: f64 },
  #[error("第 {row} 行检测记录无效: {source}")]
  Malformed {
    row: usize,
    source: MalformedDetection,
  },
}

pub(super) fn to_delimited_text(detections: &[Detection]) -> Result<Vec<u8>, ExportError> {
  let mut writer = Writer::from_writer(Vec::new());
  writer.write_record(HEADER)?;
  for detection in detections {
    writer.write_record([
      detection.confidence().to_string(),
      format_bbox(&detection.bbox()),
      detection.area().to_string(),
    ])?;
  }
  writer.into_inner().map_err(|e| e.into_error().into())
}

/// 读取 [`DetectionStats::to_delimited_text`](super::DetectionStats::to_delimited_text) 的导出
pub fn from_delimited_text(data: &[u8]) -> Result<Vec<Detection>, ExportError> {
  let mut reader = ReaderBuilder::new().has_headers(true).from_reader(data);

  let headers = reader.headers()?;
  if headers.iter().ne(HEADER) {
    return Err(ExportError::HeaderMismatch(
      headers.iter().collect::<Vec<_>>().join(","),
    ));
  }

  let mut detections = Vec::new();
  for (index, record) in reader.records().enumerate() {
    let record = record?;
    let row = index + 1;
    let field = |i: usize, name: &'static str| {
      record.get(i).map(str::trim).ok_or(ExportError::FieldError {
        row,
        field: name,
        value: String::new(),
      })
    };

    let confidence_raw = field(0, "confidence")?;
    let confidence: f32 = confidence_raw.parse().map_err(|_| ExportError::FieldError {
      row,
      field: "confidence",
      value: confidence_raw.to_string(),
    })?;

    let bbox_raw = field(1, "bbox")?;
    let bbox = parse_bbox(bbox_raw).ok_or_else(|| ExportError::FieldError {
      row,
      field: "bbox",
      value: bbox_raw.to_string(),
    })?;

    let area_raw = field(2, "bbox_area")?;
    let area: f64 = area_raw.parse().map_err(|_| ExportError::FieldError {
      row,
      field: "bbox_area",
      value: area_raw.to_string(),
    })?;

    let detection =
      Detection::new(bbox, confidence).map_err(|source| ExportError::Malformed { row, source })?;
    if (detection.area() - area).abs() > AREA_TOLERANCE {
      return Err(ExportError::AreaMismatch { row, area });
    }
    detections.push(detection);
  }
  Ok(detections)
}

fn format_bbox(bbox: &[f32; 4]) -> String {
  let [x1, y1, x2, y2] = bbox;
  format!("({}, {}, {}, {})", x1, y1, x2, y2)
}

fn parse_bbox(raw: &str) -> Option<[f32; 4]> {
  let inner = raw.strip_prefix('(')?.strip_suffix(')')?;
  let mut values = inner.split(',').map(|v| v.trim().parse::<f32>());
  let bbox = [
    values.next()?.ok()?,
    values.next()?.ok()?,
    values.next()?.ok()?,
    values.next()?.ok()?,
  ];
  values.next().is_none().then_some(bbox)
}
