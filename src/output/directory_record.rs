// 该文件是 SmartDetect 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  model::ClassNames,
  output::{Presentation, Render, draw::Record},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 保存方式：叠加图像，或原图加文本记录
pub enum DrawWrapper {
  Draw,
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    source: &RgbImage,
    presentation: &Presentation,
    class_names: &ClassNames,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw => {
        presentation.image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        source.save(path)?;
        record.record(&presentation.detections, class_names, path)?;
      }
    };

    info!("结果已保存: {}", path.display());
    Ok(())
  }

  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw,
    }
  }
}

/// 按日期分目录保存每次结果: dir/YYYY/MM/DD/HH-MM-SS-XXXX.png
///
/// 查询参数 `record=name|id` 改为保存原图和文本记录，`always` 表示没有目标时也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| if v == "id" { "record-id" } else { "record-name" })
      .unwrap_or("draw");

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind),
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    source: &RgbImage,
    presentation: &Presentation,
    class_names: &ClassNames,
  ) -> Result<(), Self::Error> {
    if !self.always && presentation.detections.is_empty() {
      debug!("没有检测到目标，跳过保存");
      return Ok(());
    }
    let path = self.frame_path()?;
    self
      .draw
      .save_result(&path, source, presentation, class_names)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  #[test]
  fn empty_result_is_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let presentation = Presentation {
      image: RgbImage::new(2, 2),
      report: Vec::new(),
      detections: Vec::new(),
    };
    let names = ClassNames::default();

    output(dir.path(), "")
      .render_result(&presentation.image, &presentation, &names)
      .unwrap();
    assert!(files_under(dir.path()).is_empty());

    output(dir.path(), "?always")
      .render_result(&presentation.image, &presentation, &names)
      .unwrap();
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().ends_with("-0001.png"));
  }

  #[test]
  fn record_mode_writes_text_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let names: ClassNames = ["cat"].into_iter().collect();
    let presentation = Presentation {
      image: RgbImage::new(2, 2),
      report: vec!["Label: cat, Confidence: 90.00%".to_string()],
      detections: vec![Detection {
        bbox: [0.0, 0.0, 1.0, 1.0],
        score: 0.9,
        class_id: 0,
      }],
    };

    output(dir.path(), "?record=name")
      .render_result(&presentation.image, &presentation, &names)
      .unwrap();
    let files = files_under(dir.path());
    let text = files
      .iter()
      .find(|path| path.extension().is_some_and(|ext| ext == "txt"))
      .unwrap();
    assert!(std::fs::read_to_string(text).unwrap().starts_with("cat, 0.9000"));
  }
}
