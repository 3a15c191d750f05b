// 该文件是 Yecao （野草） 项目的一部分。
// src/bin/yecao_stats.rs - 汇总已导出的检测数据
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use yecao::{
  output::report,
  stats::{DEFAULT_BIN_COUNT, from_delimited_text},
};

/// 读取 yecao-detect 导出的 CSV 并打印统计
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测数据 CSV
  #[arg(long, value_name = "CSV")]
  pub csv: PathBuf,
  /// 直方图分箱数
  #[arg(long, default_value_t = DEFAULT_BIN_COUNT)]
  pub bins: usize,
  /// 打印检测明细表
  #[arg(long)]
  pub table: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let data =
    std::fs::read(&args.csv).with_context(|| format!("无法读取 {}", args.csv.display()))?;
  let detections =
    from_delimited_text(&data).with_context(|| format!("无法解析 {}", args.csv.display()))?;
  info!("读取到 {} 条检测记录", detections.len());

  let mut out = std::io::stdout().lock();
  report::print_text(&mut out, &detections, args.table, args.bins)?;

  Ok(())
}
