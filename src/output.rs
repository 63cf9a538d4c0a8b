// 该文件是 SmartDetect 项目的一部分。
// src/output.rs - 结果展示与输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use crate::FromUrlWithScheme;
use crate::model::{ClassNames, Detection, InferenceResult};

pub mod draw;
pub use self::draw::{Draw, DrawError, Record};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 展示结果: 叠加图像与文字报告
#[derive(Debug, Clone)]
pub struct Presentation {
  pub image: RgbImage,
  pub report: Vec<String>,
  /// 通过阈值的目标，顺序与报告一致
  pub detections: Vec<Detection>,
}

/// 报告中的一行
pub fn report_line(name: &str, score: f32) -> String {
  format!("Label: {}, Confidence: {:.2}%", name, score * 100.0)
}

/// 保留分数严格大于阈值的目标，按类别优先、组内原顺序
pub fn filter_detections(result: &InferenceResult, score_threshold: f32) -> Vec<Detection> {
  result
    .detections()
    .filter(|detection| detection.score > score_threshold)
    .collect()
}

/// 结果展示
pub struct Presenter {
  draw: Draw,
}

impl Presenter {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }

  pub fn draw(&self) -> &Draw {
    &self.draw
  }

  /// 生成叠加图像与报告；叠加绘制使用自身阈值，报告使用传入的阈值
  pub fn present(
    &self,
    source: &RgbImage,
    result: &InferenceResult,
    class_names: &ClassNames,
    score_threshold: f32,
  ) -> Presentation {
    let detections = filter_detections(result, score_threshold);
    let report: Vec<String> = detections
      .iter()
      .map(|detection| {
        report_line(
          class_names.get(detection.class_id).unwrap_or("unknown"),
          detection.score,
        )
      })
      .collect();
    debug!(
      "阈值 {} 下保留 {}/{} 个目标",
      score_threshold,
      detections.len(),
      result.len()
    );

    let mut image = source.clone();
    self.draw.draw_detections(&mut image, result, class_names);

    info!("推理耗时: {:.2?}", result.elapsed());
    Presentation {
      image,
      report,
      detections,
    }
  }
}

pub trait Render: Sized {
  type Error;
  fn render_result(
    &self,
    source: &RgbImage,
    presentation: &Presentation,
    class_names: &ClassNames,
  ) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  #[allow(unused_variables)]
  fn render_result(
    &self,
    source: &RgbImage,
    presentation: &Presentation,
    class_names: &ClassNames,
  ) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(source, presentation, class_names)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(source, presentation, class_names)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => Ok(()),
    }
  }
}
