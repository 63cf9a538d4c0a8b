// 该文件是 SmartDetect 项目的一部分。
// src/input/remote_image.rs - 从 URL 下载图片
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

use std::{io::Read, path::PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{ImageCache, ImageCacheError};
use crate::FromUrl;

/// 下载体积上限
const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum RemoteImageError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("HTTP 状态码 {0}: {1}")]
  Status(u16, String),
  #[error("网络错误: {0}")]
  Transport(String),
  #[error("图片超过大小上限 {0} 字节")]
  TooLarge(u64),
  #[error("读取响应失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("缓存图片失败: {0}")]
  Cache(#[from] ImageCacheError),
}

/// http(s) 图片地址
#[derive(Debug, Clone)]
pub struct RemoteImage {
  url: Url,
}

impl FromUrl for RemoteImage {
  type Error = RemoteImageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(RemoteImage { url: url.clone() }),
      other => Err(RemoteImageError::SchemeMismatch(other.to_string())),
    }
  }
}

impl RemoteImage {
  pub fn url(&self) -> &Url {
    &self.url
  }

  /// 下载图片主体；失败即返回，不做重试
  pub fn fetch(&self) -> Result<Vec<u8>, RemoteImageError> {
    self.fetch_limited(MAX_IMAGE_BYTES)
  }

  fn fetch_limited(&self, max_bytes: u64) -> Result<Vec<u8>, RemoteImageError> {
    info!("下载图片: {}", self.url);
    let response = ureq::get(self.url.as_str())
      .call()
      .map_err(|e| match e {
        ureq::Error::Status(code, response) => {
          RemoteImageError::Status(code, response.status_text().to_string())
        }
        ureq::Error::Transport(transport) => RemoteImageError::Transport(transport.to_string()),
      })?;

    if response.status() != 200 {
      return Err(RemoteImageError::Status(
        response.status(),
        response.status_text().to_string(),
      ));
    }

    // 多读一个字节以区分恰好到达上限与超出上限
    let mut bytes = Vec::new();
    response
      .into_reader()
      .take(max_bytes + 1)
      .read_to_end(&mut bytes)?;
    if bytes.len() as u64 > max_bytes {
      return Err(RemoteImageError::TooLarge(max_bytes));
    }
    debug!("下载完成: {} 字节", bytes.len());
    Ok(bytes)
  }

  /// 下载并写入会话缓存，返回本地路径
  pub fn resolve(&self, cache: &ImageCache) -> Result<PathBuf, RemoteImageError> {
    let bytes = self.fetch()?;
    Ok(cache.store(&bytes)?)
  }
}
