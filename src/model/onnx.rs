// 该文件是 SmartDetect 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 会话辅助
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::Path, time::Duration, time::Instant};

use ort::{
  logging::LogLevel,
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, info};

use crate::{frame::NchwTensor, model::ModelError};

/// 一个输出张量，统一转换为 f32
#[derive(Debug, Clone)]
pub struct TensorOutput {
  pub name: String,
  pub shape: Vec<i64>,
  pub data: Vec<f32>,
}

impl TensorOutput {
  pub fn dims(&self) -> Vec<usize> {
    self.shape.iter().map(|&d| d.max(0) as usize).collect()
  }
}

/// 加载模型文件并创建推理会话
pub fn load_session(model_path: &Path) -> Result<Session, ModelError> {
  info!("加载模型文件: {}", model_path.display());
  if !model_path.is_file() {
    return Err(ModelError::ModelNotFound(model_path.to_path_buf()));
  }

  let session = Session::builder()
    .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
    .and_then(|builder| builder.with_log_level(LogLevel::Error))
    .and_then(|builder| builder.commit_from_file(model_path))
    .map_err(|e| ModelError::ModelLoad(model_path.to_path_buf(), e))?;

  debug!(
    "模型输入数量: {}, 输出数量: {}",
    session.inputs.len(),
    session.outputs.len()
  );
  Ok(session)
}

/// 读取模型自定义元数据
pub fn custom_metadata(session: &Session, key: &str) -> Result<Option<String>, ModelError> {
  let metadata = session.metadata()?;
  Ok(metadata.custom(key)?)
}

/// 执行一次前向推理，仅对推理本身计时
pub fn run_single(
  session: &mut Session,
  tensor: &NchwTensor,
) -> Result<(Vec<TensorOutput>, Duration), ModelError> {
  let input_name = session
    .inputs
    .first()
    .map(|input| input.name.clone())
    .ok_or_else(|| ModelError::InvalidOutput("模型没有输入".to_string()))?;
  let output_names: Vec<String> = session
    .outputs
    .iter()
    .map(|output| output.name.clone())
    .collect();

  let input = TensorRef::from_array_view((tensor.dims(), tensor.as_slice()))?;

  debug!("执行模型推理");
  let now = Instant::now();
  let outputs = session.run(ort::inputs![input_name.as_str() => input])?;
  let elapsed = now.elapsed();
  info!("推理完成，耗时: {:.2?}", elapsed);

  let mut results = Vec::with_capacity(output_names.len());
  for name in output_names {
    let value = &outputs[name.as_str()];
    let (shape, data) = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
      (shape.iter().copied().collect(), data.to_vec())
    } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
      (
        shape.iter().copied().collect(),
        data.iter().map(|&v| v as f32).collect(),
      )
    } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
      (
        shape.iter().copied().collect(),
        data.iter().map(|&v| v as f32).collect(),
      )
    } else {
      return Err(ModelError::InvalidOutput(format!(
        "输出 '{}' 的数据类型不受支持",
        name
      )));
    };
    debug!("输出 {}: 形状 {:?}", name, shape);
    results.push(TensorOutput { name, shape, data });
  }

  Ok((results, elapsed))
}
