// 该文件是 SmartDetect 项目的一部分。
// src/model/dump.rs - 推理原始结果的中间转储
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::model::RawResult;

#[derive(Error, Debug)]
pub enum DumpError {
  #[error("I/O 错误 {0}: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 推理结果转储，仅用于步骤之间的交接
///
/// 文件位于调用方提供的会话目录中，每个模型一个文件。
#[derive(Debug, Clone)]
pub struct ResultDump {
  path: PathBuf,
}

impl ResultDump {
  pub fn new(dir: &Path, model_name: &str) -> Self {
    Self {
      path: dir.join(format!("{}-results.json", model_name.to_lowercase())),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn write(&self, outputs: &[RawResult]) -> Result<(), DumpError> {
    info!("写入推理结果: {}", self.path.display());
    let text = serde_json::to_vec(outputs)?;
    std::fs::write(&self.path, text).map_err(|e| DumpError::Io(self.path.clone(), e))
  }

  pub fn read(&self) -> Result<Vec<RawResult>, DumpError> {
    let text = std::fs::read(&self.path).map_err(|e| DumpError::Io(self.path.clone(), e))?;
    let outputs: Vec<RawResult> = serde_json::from_slice(&text)?;
    debug!("读取推理结果: {} 项", outputs.len());
    Ok(outputs)
  }

  /// 写入后立即读回
  pub fn hand_off(&self, outputs: &[RawResult]) -> Result<Vec<RawResult>, DumpError> {
    self.write(outputs)?;
    self.read()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  #[test]
  fn named_result_survives_hand_off() {
    let dir = tempfile::tempdir().unwrap();
    let dump = ResultDump::new(dir.path(), "RepPoints");
    let mut named = BTreeMap::new();
    named.insert(
      "bbox".to_string(),
      vec![vec![[1.0, 2.0, 3.0, 4.0, 0.75]], vec![]],
    );
    let outputs = vec![RawResult::Named(named)];

    let read = dump.hand_off(&outputs).unwrap();
    assert_eq!(read, outputs);
    assert!(dump.path().ends_with("reppoints-results.json"));
  }
}
