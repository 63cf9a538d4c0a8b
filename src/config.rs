// 该文件是 SmartDetect 项目的一部分。
// src/config.rs - 运行配置
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// 默认置信度阈值，报告和叠加绘制共用
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// 未填写 URL 时使用的示例图片
pub const DEFAULT_IMAGE_URL: &str =
  "https://c402277.ssl.cf1.rackcdn.com/photos/18128/images/hero_small/Medium_WW247497.jpg";

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("无法读取配置文件 {0}: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("配置文件格式错误 {0}: {1}")]
  Parse(PathBuf, serde_json::Error),
  #[error("置信度阈值必须位于 [0, 1] 区间: {0}")]
  ThresholdOutOfRange(f32),
}

/// 运行配置
///
/// 两个检测框架的根目录都在这里显式给出，不依赖进程的当前工作目录。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// RepPoints（mmdetection 风格）根目录，包含 configs/、checkpoints/、data/
  pub root: PathBuf,
  /// YOLOv3 根目录，包含 weights/、config/、data/
  pub yolo_root: PathBuf,
  /// 置信度阈值 (0.0 - 1.0)
  pub score_threshold: f32,
  /// 标签字体（TTF），为空时只绘制边框
  pub font: Option<PathBuf>,
  /// URL 输入为空时的默认图片
  pub default_url: String,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      yolo_root: PathBuf::from("../PyTorch-YOLOv3"),
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      font: None,
      default_url: DEFAULT_IMAGE_URL.to_string(),
    }
  }
}

impl Settings {
  /// 从 JSON 文件加载配置，缺省字段取默认值
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text =
      std::fs::read_to_string(path).map_err(|e| SettingsError::Io(path.to_path_buf(), e))?;
    let settings: Settings =
      serde_json::from_str(&text).map_err(|e| SettingsError::Parse(path.to_path_buf(), e))?;
    debug!("配置内容: {:?}", settings);
    settings.validate()
  }

  pub fn validate(self) -> Result<Self, SettingsError> {
    if !(0.0..=1.0).contains(&self.score_threshold) {
      return Err(SettingsError::ThresholdOutOfRange(self.score_threshold));
    }
    Ok(self)
  }

  pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
    if let Some(threshold) = threshold {
      self.score_threshold = threshold;
    }
    self
  }

  /// RepPoints 框架内的相对路径
  pub fn in_root(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.root.join(relative)
  }

  /// YOLOv3 框架内的相对路径
  pub fn in_yolo_root(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.yolo_root.join(relative)
  }
}
