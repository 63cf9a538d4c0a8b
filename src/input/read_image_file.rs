// 该文件是 SmartDetect 项目的一部分。
// src/input/read_image_file.rs - 本地图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("图像文件不存在: {0}")]
  NotFound(PathBuf),
}

/// image:///path/to/file.jpg 形式的本地图片
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: PathBuf,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = urlencoding::decode(url.path())
      .map(|path| PathBuf::from(path.as_ref()))
      .unwrap_or_else(|_| PathBuf::from(url.path()));
    Ok(ImageFileInput { path })
  }
}

impl ImageFileInput {
  pub fn resolve(&self) -> Result<PathBuf, ImageFileInputError> {
    if !self.path.is_file() {
      return Err(ImageFileInputError::NotFound(self.path.clone()));
    }
    Ok(self.path.clone())
  }
}
