// 该文件是 SmartDetect 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use smartdetect::{
  config::{Settings, SettingsError},
  model::ModelKind,
};

/// SmartDetect 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图片
  /// 支持格式:
  /// - 示例图片: kitchen, hot dog, sports 或 sample:///kitchen
  /// - 网络图片: https://...
  /// - 本地图片: image:///path/to/file.jpg
  /// 为空时使用默认网络图片
  #[arg(long, default_value = "", value_name = "SOURCE")]
  pub image: String,

  /// 检测模型: yolov3 或 reppoints
  #[arg(long, default_value = "yolov3", value_name = "MODEL")]
  pub model: ModelKind,

  /// 输出路径，例如 image:///tmp/out.png 或 folder:///tmp/records
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  #[command(flatten)]
  pub common: CommonArgs,
}

/// 两个程序共用的配置参数
#[derive(clap::Args, Debug)]
pub struct CommonArgs {
  /// 配置文件（JSON）
  #[arg(long, value_name = "FILE")]
  pub settings: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// RepPoints 根目录
  #[arg(long, value_name = "DIR")]
  pub root: Option<PathBuf>,

  /// YOLOv3 根目录
  #[arg(long, value_name = "DIR")]
  pub yolo_root: Option<PathBuf>,

  /// 标签字体（TTF）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

impl CommonArgs {
  /// 读取配置文件，再以命令行参数覆盖
  pub fn settings(&self) -> Result<Settings, SettingsError> {
    let mut settings = match self.settings.as_ref() {
      Some(path) => Settings::from_file(path)?,
      None => Settings::default(),
    };
    if let Some(root) = self.root.clone() {
      settings.root = root;
    }
    if let Some(yolo_root) = self.yolo_root.clone() {
      settings.yolo_root = yolo_root;
    }
    if let Some(font) = self.font.clone() {
      settings.font = Some(font);
    }
    settings.with_threshold(self.threshold).validate()
  }
}
