// 该文件是 SmartDetect 项目的一部分。
// src/bin/compare.rs - 模型比较程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

#[path = "../args.rs"]
#[allow(dead_code)]
mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use smartdetect::{
  FromUrl,
  output::OutputWrapper,
  session::Session,
  task::{CompareTask, Task},
};

/// 在同一张图片上依次运行所有模型
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图片（示例名称、网络地址或 image:///path）
  #[arg(long, default_value = "", value_name = "SOURCE")]
  pub image: String,

  /// 输出目录，例如 folder:///tmp/compare?always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  #[command(flatten)]
  pub common: args::CommonArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let settings = args.common.settings()?;
  info!("输入图片: {}", args.image);

  let output = args
    .output
    .as_ref()
    .map(OutputWrapper::from_url)
    .transpose()?;

  let mut session = Session::new(settings)?;
  CompareTask { image: args.image }.run_task(&mut session, output.as_ref())
}
