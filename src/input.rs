// 该文件是 SmartDetect 项目的一部分。
// src/input.rs - 图像输入
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

use std::{
  hash::{DefaultHasher, Hash, Hasher},
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod sample;
pub use self::sample::{SAMPLE_IMAGES, SampleImage, SampleImageError, SampleInput};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "remote_image")]
mod remote_image;
#[cfg(feature = "remote_image")]
pub use self::remote_image::{RemoteImage, RemoteImageError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("示例图片错误: {0}")]
  SampleImageError(#[from] SampleImageError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "remote_image")]
  #[error("远程图片错误: {0}")]
  RemoteImageError(#[from] RemoteImageError),
  #[error("无法解析图片来源 '{0}': {1}")]
  InvalidSelection(String, url::ParseError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("无法打开图片文件 {0}: {1}")]
  Open(PathBuf, std::io::Error),
  #[error("无法解码图片文件 {0}: {1}")]
  Decode(PathBuf, image::ImageError),
}

#[derive(Error, Debug)]
pub enum ImageCacheError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("下载内容不是可解码的图片: {0}")]
  Decode(#[from] image::ImageError),
}

/// 会话级图片缓存
///
/// 下载的图片按内容哈希命名，存放在临时目录中，缓存被丢弃时目录随之删除。
pub struct ImageCache {
  dir: TempDir,
}

impl ImageCache {
  pub fn new() -> Result<Self, ImageCacheError> {
    let dir = tempfile::Builder::new()
      .prefix("smartdetect-")
      .tempdir()?;
    debug!("图片缓存目录: {}", dir.path().display());
    Ok(Self { dir })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// 校验字节可以解码为图片后写入缓存
  pub fn store(&self, bytes: &[u8]) -> Result<PathBuf, ImageCacheError> {
    let format = image::guess_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)?;

    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    let path = self
      .dir
      .path()
      .join(format!("{:016x}.{}", hasher.finish(), extension));

    if !path.exists() {
      std::fs::write(&path, bytes)?;
    }
    info!("图片已缓存: {}", path.display());
    Ok(path)
  }
}

/// 解析后的本地图片
#[derive(Debug, Clone)]
pub struct ResolvedImage {
  pub path: PathBuf,
  /// 来自预置示例时，记录示例信息以选择对应的配置文件
  pub sample: Option<&'static SampleImage>,
}

impl ResolvedImage {
  pub fn load(&self) -> Result<RgbImage, InputError> {
    load_rgb_image(&self.path)
  }
}

pub fn load_rgb_image(path: &Path) -> Result<RgbImage, InputError> {
  let image = ImageReader::open(path)
    .map_err(|e| InputError::Open(path.to_path_buf(), e))?
    .with_guessed_format()
    .map_err(|e| InputError::Open(path.to_path_buf(), e))?
    .decode()
    .map_err(|e| InputError::Decode(path.to_path_buf(), e))?;
  Ok(image.to_rgb8())
}

/// 图片来源选择
#[derive(Debug, Clone)]
pub enum InputWrapper {
  Sample(SampleInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "remote_image")]
  RemoteImage(RemoteImage),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() == SampleInput::SCHEME {
      return Ok(InputWrapper::Sample(SampleInput::from_url(url)?));
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?));
      }
    }
    #[cfg(feature = "remote_image")]
    {
      if matches!(url.scheme(), "http" | "https") {
        return Ok(InputWrapper::RemoteImage(RemoteImage::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl InputWrapper {
  /// 解析用户输入：示例名称、URL，或为空时使用默认 URL
  pub fn parse(selection: &str, default_url: &str) -> Result<Self, InputError> {
    let selection = selection.trim();
    let selection = if selection.is_empty() {
      warn!("未提供图片地址，使用默认地址: {}", default_url);
      default_url
    } else {
      selection
    };

    if let Ok(sample) = SampleImage::lookup(selection) {
      return Ok(InputWrapper::Sample(SampleInput(sample)));
    }

    let url =
      Url::parse(selection).map_err(|e| InputError::InvalidSelection(selection.to_string(), e))?;
    Self::from_url(&url)
  }

  /// 得到本地图片路径
  #[cfg_attr(not(feature = "remote_image"), allow(unused_variables))]
  pub fn resolve(&self, root: &Path, cache: &ImageCache) -> Result<ResolvedImage, InputError> {
    let resolved = match self {
      InputWrapper::Sample(SampleInput(sample)) => ResolvedImage {
        path: sample.image_path(root),
        sample: Some(*sample),
      },
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => ResolvedImage {
        path: input.resolve()?,
        sample: None,
      },
      #[cfg(feature = "remote_image")]
      InputWrapper::RemoteImage(input) => ResolvedImage {
        path: input.resolve(cache)?,
        sample: None,
      },
    };
    debug!("图片来源解析为: {}", resolved.path.display());
    Ok(resolved)
  }
}
