// 该文件是 SmartDetect 项目的一部分。
// src/model/yolov3.rs - YOLOv3 目标检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::Path, time::Duration};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
  frame::{Transform, letterbox},
  model::{
    ClassNames, Detected, Detection, Detector, ImageInput, InferenceResult, ModelConfig,
    ModelError, onnx,
  },
};

/// 模型结构描述
#[derive(Debug, Clone, Deserialize)]
pub struct Yolov3ModelDef {
  /// 正方形输入边长
  #[serde(default = "default_input_size")]
  pub input_size: u32,
  /// 解码阶段的候选框下限，与展示阈值无关
  #[serde(default = "default_candidate_threshold")]
  pub candidate_threshold: f32,
  /// NMS IOU 阈值
  #[serde(default = "default_nms_threshold")]
  pub nms_threshold: f32,
}

fn default_input_size() -> u32 {
  416
}

fn default_candidate_threshold() -> f32 {
  0.001
}

fn default_nms_threshold() -> f32 {
  0.4
}

impl Yolov3ModelDef {
  pub fn from_file(path: &Path) -> Result<Self, ModelError> {
    info!("加载模型结构: {}", path.display());
    let text =
      std::fs::read_to_string(path).map_err(|e| ModelError::ConfigIo(path.to_path_buf(), e))?;
    let model_def: Yolov3ModelDef =
      serde_json::from_str(&text).map_err(|e| ModelError::ConfigParse(path.to_path_buf(), e))?;
    if model_def.input_size == 0 {
      return Err(ModelError::InvalidConfig(
        path.to_path_buf(),
        "输入尺寸必须为正".to_string(),
      ));
    }
    Ok(model_def)
  }
}

/// 解码 [1, N, 5 + C] 输出: cx, cy, w, h, objectness, 各类别概率
pub fn decode_output(
  output: &onnx::TensorOutput,
  transform: &Transform,
  model_def: &Yolov3ModelDef,
  num_classes: usize,
) -> Result<Vec<Detection>, ModelError> {
  let dims = output.dims();
  if dims.len() != 3 || dims[2] != 5 + num_classes {
    return Err(ModelError::InvalidOutput(format!(
      "输出形状 {:?} 与类别数量 {} 不匹配",
      dims, num_classes
    )));
  }

  let mut candidates = Vec::new();
  for row in output.data.chunks_exact(dims[2]).take(dims[1]) {
    let objectness = row[4];
    if objectness < model_def.candidate_threshold {
      continue;
    }

    // 找到最高类别分数
    let mut max_class_score = 0.0f32;
    let mut max_class_id = 0usize;
    for (class_id, &score) in row[5..].iter().enumerate() {
      if score > max_class_score {
        max_class_score = score;
        max_class_id = class_id;
      }
    }

    let score = objectness * max_class_score;
    if score < model_def.candidate_threshold {
      continue;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    candidates.push(Detection {
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      score,
      class_id: max_class_id,
    });
  }
  debug!("候选框数量: {}", candidates.len());

  let mut detections = nms(candidates, model_def.nms_threshold);
  for detection in detections.iter_mut() {
    detection.bbox = transform.to_original(detection.bbox);
  }
  Ok(detections)
}

/// 按类别的非极大值抑制
fn nms(mut detections: Vec<Detection>, nms_threshold: f32) -> Vec<Detection> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result = Vec::new();
  while !detections.is_empty() {
    let best = detections.remove(0);
    detections.retain(|det| det.class_id != best.class_id || iou(&best, det) < nms_threshold);
    result.push(best);
  }
  result
}

/// 计算两个边界框的 IoU
fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.bbox[0].max(b.bbox[0]);
  let y1 = a.bbox[1].max(b.bbox[1]);
  let x2 = a.bbox[2].min(b.bbox[2]);
  let y2 = a.bbox[3].min(b.bbox[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a.bbox[2] - a.bbox[0]) * (a.bbox[3] - a.bbox[1]);
  let area_b = (b.bbox[2] - b.bbox[0]) * (b.bbox[3] - b.bbox[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 对单张图片执行检测，返回检测结果、推理耗时和类别名称
pub fn detect(
  image: ImageInput<'_>,
  weights: &Path,
  model_def: &Path,
  class_names: &Path,
) -> Result<(Vec<Detection>, Duration, ClassNames), ModelError> {
  let model_def = Yolov3ModelDef::from_file(model_def)?;
  let class_names = ClassNames::from_names_file(class_names)?;

  let image = image.load()?;
  let frame = letterbox(&image, (model_def.input_size, model_def.input_size));

  let mut session = onnx::load_session(weights)?;
  let (outputs, elapsed) = onnx::run_single(&mut session, &frame.tensor)?;
  let output = outputs
    .first()
    .ok_or_else(|| ModelError::InvalidOutput("模型没有输出".to_string()))?;

  let detections = decode_output(output, &frame.transform, &model_def, class_names.len())?;
  Ok((detections, elapsed, class_names))
}

/// YOLOv3 检测器
#[derive(Debug, Default)]
pub struct Yolov3Detector;

impl Yolov3Detector {
  pub fn new() -> Self {
    Self
  }
}

impl Detector for Yolov3Detector {
  fn name(&self) -> &'static str {
    "yolov3"
  }

  fn run(&self, image: ImageInput<'_>, config: &ModelConfig) -> Result<Detected, ModelError> {
    let ModelConfig::Yolov3 {
      weights,
      model_def,
      class_names,
    } = config
    else {
      return Err(ModelError::ConfigMismatch(self.name()));
    };

    let (detections, elapsed, class_names) = detect(image, weights, model_def, class_names)?;
    let raw = InferenceResult::group(detections, class_names.len())?;
    let result = InferenceResult::new(raw, elapsed, &class_names)?;
    info!("{} 推理得到 {} 个目标", self.name(), result.len());
    Ok(Detected {
      result,
      class_names,
    })
  }
}
