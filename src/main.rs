// 该文件是 SmartDetect 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use smartdetect::{
  FromUrl,
  output::OutputWrapper,
  session::Session,
  task::{OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let settings = args.common.settings()?;

  info!("输入图片: {}", args.image);
  info!("检测模型: {}", args.model.name());
  info!("置信度阈值: {}", settings.score_threshold);

  let output = args
    .output
    .as_ref()
    .map(OutputWrapper::from_url)
    .transpose()?;
  if let Some(url) = args.output.as_ref() {
    info!("输出路径: {}", url);
  }

  let mut session = Session::new(settings)?;
  OneShotTask {
    image: args.image,
    model: args.model,
  }
  .run_task(&mut session, output.as_ref())
}
