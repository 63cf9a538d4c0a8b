// 该文件是 SmartDetect 项目的一部分。
// src/model.rs - 检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  borrow::Cow,
  collections::BTreeMap,
  path::{Path, PathBuf},
  str::FromStr,
  time::Duration,
};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  config::Settings,
  input::{InputError, SampleImage, load_rgb_image},
};

pub mod coco;
pub mod dump;
pub mod onnx;

#[cfg(feature = "model_reppoints")]
mod reppoints;
#[cfg(feature = "model_reppoints")]
pub use self::reppoints::{RepPointsConfig, RepPointsDetector};

#[cfg(feature = "model_yolov3")]
mod yolov3;
#[cfg(feature = "model_yolov3")]
pub use self::yolov3::{Yolov3Detector, Yolov3ModelDef};

pub use self::dump::{DumpError, ResultDump};

/// 框架输出的一行: [x1, y1, x2, y2, score]
pub type BoxRow = [f32; 5];

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("无法读取配置文件 {0}: {1}")]
  ConfigIo(PathBuf, std::io::Error),
  #[error("配置文件格式错误 {0}: {1}")]
  ConfigParse(PathBuf, serde_json::Error),
  #[error("配置取值无效 {0}: {1}")]
  InvalidConfig(PathBuf, String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型加载错误 {0}: {1}")]
  ModelLoad(PathBuf, ort::Error),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("图像错误: {0}")]
  Image(#[from] InputError),
  #[error("数据集 {0} 没有定义类别")]
  MissingClasses(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("类别索引 {class_id} 超出类别数量 {num_classes}")]
  ClassIndexOutOfRange { class_id: usize, num_classes: usize },
  #[error("不支持的配置: {0}")]
  UnsupportedConfiguration(String),
  #[error("{0} 检测器无法使用该模型配置")]
  ConfigMismatch(&'static str),
  #[error("结果转储错误: {0}")]
  Dump(#[from] DumpError),
}

/// 单个检测目标，坐标为原图像素坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub score: f32,
  pub class_id: usize,
}

impl Detection {
  pub fn row(&self) -> BoxRow {
    [self.bbox[0], self.bbox[1], self.bbox[2], self.bbox[3], self.score]
  }
}

/// 与类别索引对齐的类别名称
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
  pub fn new(names: Vec<String>) -> Self {
    Self(names)
  }

  /// 每行一个类别名称，忽略空行
  pub fn from_names_file(path: &Path) -> Result<Self, ModelError> {
    let text =
      std::fs::read_to_string(path).map_err(|e| ModelError::ConfigIo(path.to_path_buf(), e))?;
    Ok(Self(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect(),
    ))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.0.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for ClassNames {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self(iter.into_iter().map(Into::into).collect())
  }
}

/// 框架直接给出的结果：按类别分组的列表，或以名称区分的多组结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawResult {
  PerClass(Vec<Vec<BoxRow>>),
  Named(BTreeMap<String, Vec<Vec<BoxRow>>>),
}

impl RawResult {
  const BBOX_KEY: &'static str = "bbox";

  pub fn into_groups(self) -> Result<Vec<Vec<BoxRow>>, ModelError> {
    match self {
      RawResult::PerClass(groups) => Ok(groups),
      RawResult::Named(mut named) => named.remove(Self::BBOX_KEY).ok_or_else(|| {
        ModelError::InvalidOutput(format!(
          "结果中缺少 '{}'，现有: {:?}",
          Self::BBOX_KEY,
          named.keys().collect::<Vec<_>>()
        ))
      }),
    }
  }
}

/// 一次推理的结果：每个类别一组（可以为空），以及前向推理耗时
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
  groups: Box<[Vec<BoxRow>]>,
  elapsed: Duration,
}

impl InferenceResult {
  pub fn new(
    raw: RawResult,
    elapsed: Duration,
    class_names: &ClassNames,
  ) -> Result<Self, ModelError> {
    let groups = raw.into_groups()?;
    if groups.len() != class_names.len() {
      return Err(ModelError::InvalidOutput(format!(
        "结果包含 {} 个类别分组，但类别名称有 {} 个",
        groups.len(),
        class_names.len()
      )));
    }
    Ok(Self {
      groups: groups.into_boxed_slice(),
      elapsed,
    })
  }

  /// 按类别归组，保持组内原有顺序
  pub fn group(
    detections: impl IntoIterator<Item = Detection>,
    num_classes: usize,
  ) -> Result<RawResult, ModelError> {
    let mut groups = vec![Vec::new(); num_classes];
    for detection in detections {
      let group = groups
        .get_mut(detection.class_id)
        .ok_or(ModelError::ClassIndexOutOfRange {
          class_id: detection.class_id,
          num_classes,
        })?;
      group.push(detection.row());
    }
    Ok(RawResult::PerClass(groups))
  }

  pub fn groups(&self) -> &[Vec<BoxRow>] {
    &self.groups
  }

  pub fn elapsed(&self) -> Duration {
    self.elapsed
  }

  pub fn num_classes(&self) -> usize {
    self.groups.len()
  }

  /// 按类别优先、组内原顺序展开
  pub fn detections(&self) -> impl Iterator<Item = Detection> + '_ {
    self.groups.iter().enumerate().flat_map(|(class_id, group)| {
      group.iter().map(move |row| Detection {
        bbox: [row[0], row[1], row[2], row[3]],
        score: row[4],
        class_id,
      })
    })
  }

  pub fn len(&self) -> usize {
    self.groups.iter().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 检测器输出
#[derive(Debug, Clone)]
pub struct Detected {
  pub result: InferenceResult,
  pub class_names: ClassNames,
}

/// 输入图片：文件路径或已解码图像
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
  Path(&'a Path),
  Image(&'a RgbImage),
}

impl<'a> ImageInput<'a> {
  pub fn load(&self) -> Result<Cow<'a, RgbImage>, ModelError> {
    match *self {
      ImageInput::Path(path) => Ok(Cow::Owned(load_rgb_image(path)?)),
      ImageInput::Image(image) => Ok(Cow::Borrowed(image)),
    }
  }
}

/// 指定要加载的外部模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelConfig {
  RepPoints {
    config_file: PathBuf,
    checkpoint_file: PathBuf,
  },
  Yolov3 {
    weights: PathBuf,
    model_def: PathBuf,
    class_names: PathBuf,
  },
}

/// 检测器
///
/// 每次调用都重新加载配置与权重，不在调用之间缓存模型。
pub trait Detector {
  fn name(&self) -> &'static str;
  fn run(&self, image: ImageInput<'_>, config: &ModelConfig) -> Result<Detected, ModelError>;
}

const REPPOINTS_CHECKPOINT: &str = "checkpoints/reppoints_moment_x101_dcn_fpn_2x_mt.onnx";
const REPPOINTS_URL_CONFIG: &str = "configs/urltest.json";
const YOLOV3_WEIGHTS: &str = "weights/yolov3.onnx";
const YOLOV3_MODEL_DEF: &str = "config/yolov3.json";
const YOLOV3_CLASS_NAMES: &str = "data/coco.names";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
  Yolov3,
  RepPoints,
}

#[derive(Error, Debug)]
#[error("未知模型: {0}，可选 yolov3 或 reppoints")]
pub struct UnknownModel(String);

impl FromStr for ModelKind {
  type Err = UnknownModel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "yolov3" => Ok(ModelKind::Yolov3),
      "reppoints" => Ok(ModelKind::RepPoints),
      _ => Err(UnknownModel(s.to_string())),
    }
  }
}

impl ModelKind {
  pub const ALL: [ModelKind; 2] = [ModelKind::Yolov3, ModelKind::RepPoints];

  pub fn name(&self) -> &'static str {
    match self {
      ModelKind::Yolov3 => "yolov3",
      ModelKind::RepPoints => "RepPoints",
    }
  }

  /// 根据所选图片构造模型配置；示例图片决定 RepPoints 使用的配置文件
  pub fn model_config(&self, settings: &Settings, sample: Option<&SampleImage>) -> ModelConfig {
    match self {
      ModelKind::Yolov3 => ModelConfig::Yolov3 {
        weights: settings.in_yolo_root(YOLOV3_WEIGHTS),
        model_def: settings.in_yolo_root(YOLOV3_MODEL_DEF),
        class_names: settings.in_yolo_root(YOLOV3_CLASS_NAMES),
      },
      ModelKind::RepPoints => ModelConfig::RepPoints {
        config_file: sample
          .map(|sample| sample.config_path(&settings.root))
          .unwrap_or_else(|| settings.in_root(REPPOINTS_URL_CONFIG)),
        checkpoint_file: settings.in_root(REPPOINTS_CHECKPOINT),
      },
    }
  }

  /// 创建检测器，dump_dir 为本次会话的中间结果目录
  #[cfg_attr(not(feature = "model_reppoints"), allow(unused_variables))]
  pub fn detector(&self, dump_dir: &Path) -> Result<Box<dyn Detector>, ModelError> {
    match self {
      #[cfg(feature = "model_yolov3")]
      ModelKind::Yolov3 => Ok(Box::new(Yolov3Detector::new())),
      #[cfg(feature = "model_reppoints")]
      ModelKind::RepPoints => Ok(Box::new(RepPointsDetector::new(dump_dir))),
      #[allow(unreachable_patterns)]
      other => Err(ModelError::UnsupportedConfiguration(format!(
        "未启用模型 {}",
        other.name()
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(n: usize) -> ClassNames {
    (0..n).map(|i| format!("class{}", i)).collect()
  }

  #[test]
  fn group_keeps_one_entry_per_class() {
    let detections = vec![
      Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        score: 0.4,
        class_id: 2,
      },
      Detection {
        bbox: [1.0, 1.0, 2.0, 2.0],
        score: 0.9,
        class_id: 0,
      },
      Detection {
        bbox: [2.0, 2.0, 3.0, 3.0],
        score: 0.8,
        class_id: 2,
      },
    ];
    let raw = InferenceResult::group(detections, 4).unwrap();
    let result = InferenceResult::new(raw, Duration::from_millis(5), &names(4)).unwrap();

    assert_eq!(result.num_classes(), 4);
    assert_eq!(result.groups()[1].len(), 0);
    assert_eq!(result.groups()[3].len(), 0);
    let order: Vec<_> = result.detections().map(|d| (d.class_id, d.score)).collect();
    assert_eq!(order, vec![(0, 0.9), (2, 0.4), (2, 0.8)]);
  }

  #[test]
  fn group_rejects_unknown_class() {
    let detection = Detection {
      bbox: [0.0; 4],
      score: 0.5,
      class_id: 3,
    };
    assert!(matches!(
      InferenceResult::group([detection], 3),
      Err(ModelError::ClassIndexOutOfRange {
        class_id: 3,
        num_classes: 3
      })
    ));
  }

  #[test]
  fn named_result_uses_bbox_set() {
    let mut named = BTreeMap::new();
    named.insert("bbox".to_string(), vec![vec![], vec![[0.0, 0.0, 1.0, 1.0, 0.3]]]);
    named.insert("segm".to_string(), vec![]);
    let result =
      InferenceResult::new(RawResult::Named(named), Duration::ZERO, &names(2)).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.detections().next().unwrap().class_id, 1);
  }

  #[test]
  fn group_count_must_match_class_names() {
    let raw = RawResult::PerClass(vec![vec![]; 3]);
    assert!(matches!(
      InferenceResult::new(raw, Duration::ZERO, &names(2)),
      Err(ModelError::InvalidOutput(_))
    ));
  }

  #[test]
  fn model_kind_parses_case_insensitively() {
    assert_eq!("RepPoints".parse::<ModelKind>().unwrap(), ModelKind::RepPoints);
    assert_eq!("yolov3".parse::<ModelKind>().unwrap(), ModelKind::Yolov3);
    assert!("ssd".parse::<ModelKind>().is_err());
  }

  #[test]
  fn url_images_use_url_config() {
    let settings = Settings::default();
    let config = ModelKind::RepPoints.model_config(&settings, None);
    assert_eq!(
      config,
      ModelConfig::RepPoints {
        config_file: PathBuf::from("./configs/urltest.json"),
        checkpoint_file: PathBuf::from("./checkpoints/reppoints_moment_x101_dcn_fpn_2x_mt.onnx"),
      }
    );
  }
}
