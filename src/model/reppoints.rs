// 该文件是 SmartDetect 项目的一部分。
// src/model/reppoints.rs - RepPoints 检测器（mmdetection 风格配置）
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
  frame::{Normalize, Transform, rescale_pad},
  model::{
    ClassNames, Detected, Detection, Detector, ImageInput, InferenceResult, ModelConfig,
    ModelError, ResultDump, coco::coco_class_names, onnx,
  },
};

const CHECKPOINT_CLASSES_KEY: &str = "CLASSES";
const LAUNCHER_NONE: &str = "none";

/// 配置文件中的模型部分
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
  #[serde(rename = "type", default)]
  pub kind: String,
  /// 预训练权重路径，推理时忽略
  #[serde(default)]
  pub pretrained: Option<String>,
  /// 模型输入尺寸 [宽, 高]
  pub input_size: [u32; 2],
  #[serde(default)]
  pub img_norm: ImgNorm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImgNorm {
  pub mean: [f32; 3],
  pub std: [f32; 3],
  #[serde(default = "default_to_rgb")]
  pub to_rgb: bool,
}

fn default_to_rgb() -> bool {
  true
}

impl Default for ImgNorm {
  fn default() -> Self {
    Self {
      mean: [123.675, 116.28, 103.53],
      std: [58.395, 57.12, 57.375],
      to_rgb: true,
    }
  }
}

/// 测试数据集定义，提供类别名称
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSection {
  #[serde(rename = "type", default = "default_dataset_type")]
  pub kind: String,
  #[serde(default)]
  pub classes: Option<Vec<String>>,
  /// 类别文件，相对于配置文件所在目录
  #[serde(default)]
  pub classes_file: Option<PathBuf>,
  #[serde(default)]
  pub test_mode: bool,
}

fn default_dataset_type() -> String {
  "CocoDataset".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
  #[serde(default)]
  pub workers_per_gpu: usize,
  pub test: DatasetSection,
}

/// RepPoints 配置文件
#[derive(Debug, Clone, Deserialize)]
pub struct RepPointsConfig {
  pub model: ModelSection,
  pub data: DataSection,
  #[serde(default)]
  pub dist: DistSection,
  #[serde(default)]
  pub fp16: Option<serde_json::Value>,
  #[serde(default)]
  pub cudnn_benchmark: bool,
}

fn default_launcher() -> String {
  LAUNCHER_NONE.to_string()
}

/// 分布式启动方式
#[derive(Debug, Clone, Deserialize)]
pub struct DistSection {
  #[serde(default = "default_launcher")]
  pub launcher: String,
}

impl Default for DistSection {
  fn default() -> Self {
    Self {
      launcher: default_launcher(),
    }
  }
}

impl RepPointsConfig {
  pub fn from_file(path: &Path) -> Result<Self, ModelError> {
    info!("加载配置文件: {}", path.display());
    let text =
      std::fs::read_to_string(path).map_err(|e| ModelError::ConfigIo(path.to_path_buf(), e))?;
    let mut config: RepPointsConfig =
      serde_json::from_str(&text).map_err(|e| ModelError::ConfigParse(path.to_path_buf(), e))?;

    if config.model.input_size.contains(&0) {
      return Err(ModelError::InvalidConfig(
        path.to_path_buf(),
        format!("输入尺寸必须为正: {:?}", config.model.input_size),
      ));
    }

    config.model.pretrained = None;
    config.data.test.test_mode = true;
    if config.cudnn_benchmark {
      debug!("cudnn_benchmark 在 ONNX Runtime 下无效，已忽略");
    }
    if config.fp16.is_some() {
      debug!("fp16 设置在 ONNX Runtime 下无效，已忽略");
    }
    Ok(config)
  }

  /// 仅支持单进程推理，分布式启动方式直接报错
  pub fn check_launcher(&self) -> Result<(), ModelError> {
    if self.dist.launcher != LAUNCHER_NONE {
      return Err(ModelError::UnsupportedConfiguration(format!(
        "分布式推理 (launcher = '{}') 尚未实现",
        self.dist.launcher
      )));
    }
    Ok(())
  }

  /// 数据集类别：显式列表、类别文件，或 COCO 默认类别
  pub fn dataset_classes(&self, config_dir: &Path) -> Result<ClassNames, ModelError> {
    let test = &self.data.test;
    if let Some(classes) = &test.classes {
      return Ok(classes.iter().cloned().collect());
    }
    if let Some(file) = &test.classes_file {
      return ClassNames::from_names_file(&config_dir.join(file));
    }
    if test.kind == default_dataset_type() {
      return Ok(coco_class_names());
    }
    Err(ModelError::MissingClasses(test.kind.clone()))
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.model.input_size[0], self.model.input_size[1])
  }

  pub fn normalize(&self) -> Normalize {
    Normalize {
      mean: self.model.img_norm.mean,
      std: self.model.img_norm.std,
    }
  }
}

/// 优先使用权重文件中记录的类别，旧权重没有记录时退回数据集类别
pub fn resolve_class_names(
  checkpoint: Option<String>,
  dataset: impl FnOnce() -> Result<ClassNames, ModelError>,
) -> Result<ClassNames, ModelError> {
  match checkpoint {
    Some(text) => match serde_json::from_str::<Vec<String>>(&text) {
      Ok(names) if !names.is_empty() => {
        debug!("使用权重文件中的 {} 个类别", names.len());
        Ok(ClassNames::new(names))
      }
      Ok(_) => dataset(),
      Err(e) => {
        warn!("权重文件中的类别信息无法解析: {}，使用数据集类别", e);
        dataset()
      }
    },
    None => dataset(),
  }
}

/// 解析导出模型的输出
///
/// 支持两种形式：`dets [1, N, 5]` 加 `labels [1, N]`，或单个 `[1, N, 6]`（第 6 列为类别）。
/// 坐标位于模型输入坐标系，映射回原图。
pub fn decode_outputs(
  outputs: &[onnx::TensorOutput],
  transform: &Transform,
) -> Result<Vec<Detection>, ModelError> {
  let dets = outputs
    .iter()
    .find(|output| {
      let dims = output.dims();
      dims.len() == 3 && (dims[2] == 5 || dims[2] == 6)
    })
    .ok_or_else(|| ModelError::InvalidOutput("找不到检测框输出".to_string()))?;
  let dims = dets.dims();
  let (count, width) = (dims[1], dims[2]);

  let labels: Option<&[f32]> = if width == 6 {
    None
  } else {
    let labels = outputs
      .iter()
      .find(|output| output.dims().len() == 2)
      .ok_or_else(|| ModelError::InvalidOutput("找不到类别输出".to_string()))?;
    if labels.data.len() != count {
      return Err(ModelError::InvalidOutput(format!(
        "检测框数量 {} 与类别数量 {} 不一致",
        count,
        labels.data.len()
      )));
    }
    Some(labels.data.as_slice())
  };

  let mut detections = Vec::with_capacity(count);
  for (i, row) in dets.data.chunks_exact(width).take(count).enumerate() {
    let label = match labels {
      Some(labels) => labels[i],
      None => row[5],
    };
    if label < 0.0 {
      return Err(ModelError::InvalidOutput(format!("类别索引为负: {}", label)));
    }
    detections.push(Detection {
      bbox: transform.to_original([row[0], row[1], row[2], row[3]]),
      score: row[4],
      class_id: label.round() as usize,
    });
  }
  debug!("检测到 {} 个物体", detections.len());
  Ok(detections)
}

fn to_bgr(image: &RgbImage) -> RgbImage {
  let mut image = image.clone();
  for pixel in image.pixels_mut() {
    pixel.0.swap(0, 2);
  }
  image
}

/// RepPoints 检测器
pub struct RepPointsDetector {
  dump_dir: PathBuf,
}

impl RepPointsDetector {
  pub fn new(dump_dir: &Path) -> Self {
    Self {
      dump_dir: dump_dir.to_path_buf(),
    }
  }
}

impl Detector for RepPointsDetector {
  fn name(&self) -> &'static str {
    "RepPoints"
  }

  fn run(&self, image: ImageInput<'_>, config: &ModelConfig) -> Result<Detected, ModelError> {
    let ModelConfig::RepPoints {
      config_file,
      checkpoint_file,
    } = config
    else {
      return Err(ModelError::ConfigMismatch(self.name()));
    };

    let cfg = RepPointsConfig::from_file(config_file)?;
    cfg.check_launcher()?;
    let config_dir = config_file.parent().unwrap_or(Path::new("."));

    // 单张图片的数据集
    let image = image.load()?;
    let frame = if cfg.model.img_norm.to_rgb {
      rescale_pad(&image, cfg.input_size(), &cfg.normalize())
    } else {
      rescale_pad(&to_bgr(&image), cfg.input_size(), &cfg.normalize())
    };
    debug!(
      "输入尺寸: {}x{}, 缩放比例: {:.3}",
      frame.tensor.width(),
      frame.tensor.height(),
      frame.transform.scale
    );

    let mut session = onnx::load_session(checkpoint_file)?;
    let checkpoint_classes = onnx::custom_metadata(&session, CHECKPOINT_CLASSES_KEY)?;
    let class_names =
      resolve_class_names(checkpoint_classes, || cfg.dataset_classes(config_dir))?;

    let (outputs, elapsed) = onnx::run_single(&mut session, &frame.tensor)?;
    drop(session);

    let detections = decode_outputs(&outputs, &frame.transform)?;
    let raw = InferenceResult::group(detections, class_names.len())?;

    let dump = ResultDump::new(&self.dump_dir, self.name());
    let raw = dump
      .hand_off(&[raw])?
      .into_iter()
      .next()
      .ok_or_else(|| ModelError::InvalidOutput("转储结果为空".to_string()))?;

    let result = InferenceResult::new(raw, elapsed, &class_names)?;
    info!("{} 推理得到 {} 个候选框", self.name(), result.len());
    Ok(Detected {
      result,
      class_names,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity() -> Transform {
    Transform {
      scale: 1.0,
      pad_x: 0.0,
      pad_y: 0.0,
      width: 100,
      height: 100,
    }
  }

  fn write_config(dir: &Path, launcher: &str) -> PathBuf {
    let path = dir.join("test_single_image.json");
    let text = format!(
      r#"{{
        "model": {{ "type": "RepPointsDetector", "pretrained": "torchvision://resnet50", "input_size": [64, 64] }},
        "data": {{ "workers_per_gpu": 2, "test": {{ "type": "CustomDataset", "classes": ["cat", "dog"] }} }},
        "dist": {{ "launcher": "{}" }}
      }}"#,
      launcher
    );
    std::fs::write(&path, text).unwrap();
    path
  }

  #[test]
  fn config_forces_test_mode() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RepPointsConfig::from_file(&write_config(dir.path(), "none")).unwrap();
    assert!(cfg.data.test.test_mode);
    assert!(cfg.model.pretrained.is_none());
    assert_eq!(cfg.input_size(), (64, 64));
    assert_eq!(
      cfg.dataset_classes(dir.path()).unwrap(),
      ClassNames::new(vec!["cat".into(), "dog".into()])
    );
  }

  #[test]
  fn distributed_launcher_is_rejected_before_loading_weights() {
    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig::RepPoints {
      config_file: write_config(dir.path(), "pytorch"),
      checkpoint_file: dir.path().join("missing.onnx"),
    };
    let image = RgbImage::new(8, 8);
    let detector = RepPointsDetector::new(dir.path());
    assert!(matches!(
      detector.run(ImageInput::Image(&image), &config),
      Err(ModelError::UnsupportedConfiguration(_))
    ));
  }

  #[test]
  fn missing_checkpoint_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig::RepPoints {
      config_file: write_config(dir.path(), "none"),
      checkpoint_file: dir.path().join("missing.onnx"),
    };
    let image = RgbImage::new(8, 8);
    let detector = RepPointsDetector::new(dir.path());
    assert!(matches!(
      detector.run(ImageInput::Image(&image), &config),
      Err(ModelError::ModelNotFound(_))
    ));
  }

  #[test]
  fn zero_input_size_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zero.json");
    std::fs::write(&path, r#"{ "model": { "input_size": [0, 64] }, "data": { "test": {} } }"#).unwrap();
    assert!(matches!(
      RepPointsConfig::from_file(&path),
      Err(ModelError::InvalidConfig(..))
    ));
  }

  #[test]
  fn checkpoint_classes_take_precedence() {
    let dataset = ClassNames::new(vec!["a".into()]);
    let names =
      resolve_class_names(Some(r#"["cat", "dog"]"#.to_string()), || Ok(dataset.clone())).unwrap();
    assert_eq!(names.get(1), Some("dog"));
    assert_eq!(
      resolve_class_names(None, || Ok(dataset.clone())).unwrap(),
      dataset
    );
    assert_eq!(
      resolve_class_names(Some("not json".to_string()), || Ok(dataset.clone())).unwrap(),
      dataset
    );
  }

  #[test]
  fn checkpoint_classes_skip_dataset_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");
    let text = r#"{
      "model": { "input_size": [64, 64] },
      "data": { "test": { "type": "CustomDataset" } }
    }"#;
    std::fs::write(&path, text).unwrap();
    let cfg = RepPointsConfig::from_file(&path).unwrap();
    assert!(matches!(
      cfg.dataset_classes(dir.path()),
      Err(ModelError::MissingClasses(_))
    ));

    let names = resolve_class_names(Some(r#"["cat"]"#.to_string()), || {
      cfg.dataset_classes(dir.path())
    })
    .unwrap();
    assert_eq!(names, ClassNames::new(vec!["cat".into()]));
    assert!(matches!(
      resolve_class_names(None, || cfg.dataset_classes(dir.path())),
      Err(ModelError::MissingClasses(_))
    ));
  }

  #[test]
  fn decodes_dets_and_labels() {
    let outputs = vec![
      onnx::TensorOutput {
        name: "dets".into(),
        shape: vec![1, 2, 5],
        data: vec![0.0, 0.0, 10.0, 10.0, 0.9, 5.0, 5.0, 20.0, 20.0, 0.2],
      },
      onnx::TensorOutput {
        name: "labels".into(),
        shape: vec![1, 2],
        data: vec![0.0, 1.0],
      },
    ];
    let detections = decode_outputs(&outputs, &identity()).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].bbox, [0.0, 0.0, 10.0, 10.0]);
    assert_eq!(detections[1].class_id, 1);
    assert_eq!(detections[1].score, 0.2);
  }

  #[test]
  fn decodes_single_output_with_label_column() {
    let outputs = vec![onnx::TensorOutput {
      name: "output".into(),
      shape: vec![1, 1, 6],
      data: vec![1.0, 2.0, 3.0, 4.0, 0.5, 2.0],
    }];
    let detections = decode_outputs(&outputs, &identity()).unwrap();
    assert_eq!(detections[0].class_id, 2);
  }
}
