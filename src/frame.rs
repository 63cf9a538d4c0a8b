// 该文件是 SmartDetect 项目的一部分。
// src/frame.rs - NCHW 输入张量与几何变换
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 逐通道归一化参数，作用于 0-255 像素值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Normalize {
  /// 仅缩放到 [0, 1]
  pub const UNIT: Normalize = Normalize {
    mean: [0.0, 0.0, 0.0],
    std: [255.0, 255.0, 255.0],
  };

  fn apply(&self, channel: usize, value: u8) -> f32 {
    (value as f32 - self.mean[channel]) / self.std[channel]
  }
}

/// 原图坐标到模型输入坐标的变换: input = original * scale + pad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  /// 原图宽度
  pub width: u32,
  /// 原图高度
  pub height: u32,
}

impl Transform {
  /// 将模型输入坐标系下的 [x1, y1, x2, y2] 映射回原图并裁剪到图像边界
  pub fn to_original(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.width as f32, self.height as f32);
    [
      ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
    ]
  }
}

/// 批大小为 1 的 RGB NCHW 浮点张量
#[derive(Debug, Clone)]
pub struct NchwTensor {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  fn filled(width: usize, height: usize, value: f32) -> Self {
    Self {
      width,
      height,
      data: vec![value; RGB_CHANNELS * width * height].into_boxed_slice(),
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// ONNX Runtime 使用的形状 [1, C, H, W]
  pub fn dims(&self) -> Vec<i64> {
    vec![1, RGB_CHANNELS as i64, self.height as i64, self.width as i64]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  fn blit(&mut self, image: &RgbImage, offset_x: usize, offset_y: usize, norm: &Normalize) {
    let plane = self.width * self.height;
    for (x, y, pixel) in image.enumerate_pixels() {
      let (x, y) = (x as usize + offset_x, y as usize + offset_y);
      if x >= self.width || y >= self.height {
        continue;
      }
      let idx = y * self.width + x;
      for c in 0..RGB_CHANNELS {
        self.data[c * plane + idx] = norm.apply(c, pixel[c]);
      }
    }
  }
}

/// 预处理后的单帧输入
#[derive(Debug, Clone)]
pub struct PreparedFrame {
  pub tensor: NchwTensor,
  pub transform: Transform,
}

fn fit_scale(image: &RgbImage, size: (u32, u32)) -> (f32, u32, u32) {
  let (w, h) = image.dimensions();
  let scale = (size.0 as f32 / w as f32).min(size.1 as f32 / h as f32);
  let new_w = ((w as f32 * scale).round() as u32).clamp(1, size.0);
  let new_h = ((h as f32 * scale).round() as u32).clamp(1, size.1);
  (scale, new_w, new_h)
}

/// 保持宽高比缩放并在右下方补零（归一化之后的零值）
pub fn rescale_pad(image: &RgbImage, size: (u32, u32), norm: &Normalize) -> PreparedFrame {
  let (scale, new_w, new_h) = fit_scale(image, size);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

  let mut tensor = NchwTensor::filled(size.0 as usize, size.1 as usize, 0.0);
  tensor.blit(&resized, 0, 0, norm);

  PreparedFrame {
    tensor,
    transform: Transform {
      scale,
      pad_x: 0.0,
      pad_y: 0.0,
      width: image.width(),
      height: image.height(),
    },
  }
}

/// 保持宽高比缩放并居中放置，四周以灰色填充
pub fn letterbox(image: &RgbImage, size: (u32, u32)) -> PreparedFrame {
  let (scale, new_w, new_h) = fit_scale(image, size);
  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
  let pad_x = (size.0 - new_w) / 2;
  let pad_y = (size.1 - new_h) / 2;

  let mut tensor = NchwTensor::filled(size.0 as usize, size.1 as usize, 128.0 / 255.0);
  tensor.blit(&resized, pad_x as usize, pad_y as usize, &Normalize::UNIT);

  PreparedFrame {
    tensor,
    transform: Transform {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      width: image.width(),
      height: image.height(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn letterbox_centers_wide_image() {
    let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
    let frame = letterbox(&image, (100, 100));

    assert_eq!(frame.tensor.dims(), vec![1, 3, 100, 100]);
    assert_eq!(frame.transform.scale, 0.5);
    assert_eq!(frame.transform.pad_y, 25.0);

    let data = frame.tensor.as_slice();
    // 填充区域为灰色，图像区域红色通道为 1
    assert!((data[0] - 128.0 / 255.0).abs() < 1e-6);
    assert!((data[50 * 100 + 50] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn transform_maps_back_and_clamps() {
    let image = RgbImage::new(200, 100);
    let frame = letterbox(&image, (100, 100));
    let bbox = frame.transform.to_original([10.0, 25.0, 60.0, 90.0]);
    assert_eq!(bbox, [20.0, 0.0, 120.0, 100.0]);
  }

  #[test]
  fn rescale_pad_keeps_origin() {
    let image = RgbImage::from_pixel(50, 100, Rgb([10, 20, 30]));
    let norm = Normalize {
      mean: [10.0, 20.0, 30.0],
      std: [1.0, 1.0, 1.0],
    };
    let frame = rescale_pad(&image, (64, 64), &norm);
    assert_eq!(frame.transform.pad_x, 0.0);
    assert_eq!(frame.transform.scale, 0.64);
    assert!(frame.tensor.as_slice().iter().all(|v| v.abs() < 1e-6));
  }
}
