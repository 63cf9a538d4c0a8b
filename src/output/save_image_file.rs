// 该文件是 SmartDetect 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::ClassNames,
  output::{Presentation, Render},
};

/// 保存叠加图像，并在同名 .txt 中写入报告
pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = urlencoding::decode(uri.path())
      .map(|path| path.into_owned())
      .unwrap_or_else(|_| uri.path().to_string());
    Ok(SaveImageFileOutput {
      path: PathBuf::from(path),
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage, report: &[String]) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;
    std::fs::write(self.path.with_extension("txt"), report.join("\n"))
      .map_err(SaveImageFileError::IoError)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    _source: &RgbImage,
    presentation: &Presentation,
    _class_names: &ClassNames,
  ) -> Result<(), Self::Error> {
    self.save_image(&presentation.image, &presentation.report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn saves_image_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/out.png");
    let url = Url::from_file_path(&target).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), target.as_path());

    let presentation = Presentation {
      image: RgbImage::new(3, 3),
      report: vec!["Label: cat, Confidence: 90.00%".to_string()],
      detections: Vec::new(),
    };
    output
      .render_result(&presentation.image, &presentation, &ClassNames::default())
      .unwrap();

    assert!(target.is_file());
    assert_eq!(
      std::fs::read_to_string(target.with_extension("txt")).unwrap(),
      "Label: cat, Confidence: 90.00%"
    );
  }
}
