// 该文件是 SmartDetect 项目的一部分。
// src/task.rs - 任务定义
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

use std::time::Duration;

use tracing::{info, warn};

use crate::{
  model::ModelKind,
  output::Render,
  session::{Outcome, Session},
};

pub trait Task<O>: Sized {
  type Error;
  fn run_task(self, session: &mut Session, output: Option<&O>) -> Result<(), Self::Error>;
}

fn render<O>(output: Option<&O>, outcome: &Outcome) -> anyhow::Result<()>
where
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  if let Some(output) = output {
    output.render_result(
      &outcome.source,
      &outcome.presentation,
      &outcome.detected.class_names,
    )?;
  }
  Ok(())
}

/// 对一张图片运行一个模型，并输出报告
pub struct OneShotTask {
  pub image: String,
  pub model: ModelKind,
}

impl<O> Task<O> for OneShotTask
where
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, session: &mut Session, output: Option<&O>) -> Result<(), Self::Error> {
    info!("开始任务...");
    session.choose_image(&self.image)?;
    session.choose_model(self.model)?;
    let outcome = session.run()?;

    info!(
      "{} 推理完成，耗时: {:.2?}",
      outcome.model.name(),
      outcome.detected.result.elapsed()
    );
    if outcome.presentation.report.is_empty() {
      warn!("没有高于阈值的目标");
    }
    for line in outcome.presentation.report.iter() {
      println!("{}", line);
    }
    render(output, outcome)?;
    info!("任务完成");

    Ok(())
  }
}

/// 同一张图片依次运行所有模型，比较推理耗时
pub struct CompareTask {
  pub image: String,
}

impl<O> Task<O> for CompareTask
where
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, session: &mut Session, output: Option<&O>) -> Result<(), Self::Error> {
    info!("开始比较任务...");
    session.choose_image(&self.image)?;

    let mut times: Vec<(ModelKind, Duration)> = Vec::with_capacity(ModelKind::ALL.len());
    for model in ModelKind::ALL {
      session.choose_model(model)?;
      let outcome = session.run()?;
      let elapsed = outcome.detected.result.elapsed();
      info!("({})推理完成，耗时: {:.2?}", model.name(), elapsed);
      println!("[{}]", model.name());
      for line in outcome.presentation.report.iter() {
        println!("{}", line);
      }
      render(output, outcome)?;
      times.push((model, elapsed));
    }

    for (model, elapsed) in times.iter() {
      warn!("{} 推理时间: {:.2?}", model.name(), elapsed);
    }

    Ok(())
  }
}
