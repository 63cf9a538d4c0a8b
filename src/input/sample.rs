// 该文件是 SmartDetect 项目的一部分。
// src/input/sample.rs - 预置示例图片
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum SampleImageError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的示例图片: {0}")]
  UnknownSample(String),
}

/// 预置示例图片，附带其对应的 RepPoints 配置文件
#[derive(Debug, PartialEq, Eq)]
pub struct SampleImage {
  pub name: &'static str,
  pub image: &'static str,
  pub config: &'static str,
}

pub static SAMPLE_IMAGES: [SampleImage; 3] = [
  SampleImage {
    name: "kitchen",
    image: "data/coco/sample_image_1/000000397133.jpg",
    config: "configs/test_single_image.json",
  },
  SampleImage {
    name: "hot dog",
    image: "data/coco/sample_image_2/000000548555.jpg",
    config: "configs/sample2_config.json",
  },
  SampleImage {
    name: "sports",
    image: "data/coco/sample_image_3/000000232692.jpg",
    config: "configs/sample3_config.json",
  },
];

impl SampleImage {
  pub fn lookup(name: &str) -> Result<&'static SampleImage, SampleImageError> {
    SAMPLE_IMAGES
      .iter()
      .find(|sample| sample.name == name)
      .ok_or_else(|| SampleImageError::UnknownSample(name.to_string()))
  }

  pub fn names() -> impl Iterator<Item = &'static str> {
    SAMPLE_IMAGES.iter().map(|sample| sample.name)
  }

  pub fn image_path(&self, root: &Path) -> PathBuf {
    root.join(self.image)
  }

  pub fn config_path(&self, root: &Path) -> PathBuf {
    root.join(self.config)
  }
}

/// sample:///kitchen 形式的选择
#[derive(Debug, Clone, Copy)]
pub struct SampleInput(pub &'static SampleImage);

impl FromUrlWithScheme for SampleInput {
  const SCHEME: &'static str = "sample";
}

impl FromUrl for SampleInput {
  type Error = SampleImageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SampleImageError::SchemeMismatch);
    }

    let raw = url.host_str().unwrap_or_default().to_string() + url.path();
    let raw = raw.trim_matches('/');
    let name = urlencoding::decode(raw)
      .map(|name| name.into_owned())
      .unwrap_or_else(|_| raw.to_string());
    Ok(SampleInput(SampleImage::lookup(&name)?))
  }
}
