// 该文件是 SmartDetect 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{ClassNames, Detection, InferenceResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {0}: {1}")]
  FontIo(PathBuf, std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
}

/// 叠加绘制
///
/// 只绘制分数高于自身阈值的目标，阈值在构造时确定。
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
  score_threshold: f32,
}

impl Draw {
  pub fn new(score_threshold: f32) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
      score_threshold,
    }
  }

  /// 加载标签字体，没有字体时只绘制边框
  pub fn with_font_file(mut self, path: &Path) -> Result<Self, DrawError> {
    info!("加载字体: {}", path.display());
    let data = std::fs::read(path).map_err(|e| DrawError::FontIo(path.to_path_buf(), e))?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.to_path_buf()))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  /// 按类别着色
  fn class_color(class_id: usize, num_classes: usize) -> [u8; 3] {
    let hue = (class_id as f32 * 360.0) / num_classes.max(1) as f32;
    hsv_to_rgb(hue, 0.8, 0.9)
  }

  /// 在图像上绘制检测结果
  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    result: &InferenceResult,
    class_names: &ClassNames,
  ) {
    let mut drawn = 0usize;
    for detection in result.detections() {
      if detection.score <= self.score_threshold {
        continue;
      }
      let color = Self::class_color(detection.class_id, result.num_classes());
      let name = class_names.get(detection.class_id).unwrap_or("unknown");
      self.draw_bbox_with_label(image, &detection, name, color);
      drawn += 1;
    }
    debug!("绘制 {} 个目标", drawn);
  }

  // bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    detection: &Detection,
    name: &str,
    color: [u8; 3],
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let bbox = detection.bbox;

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    let (box_w, box_h) = ((x_max - x_min) as u32, (y_max - y_min) as u32);
    let outer = Rect::at(x_min, y_min).of_size(box_w + 1, box_h + 1);
    draw_hollow_rect_mut(image, outer, Rgb(color));
    if box_w > 2 && box_h > 2 {
      let inner = Rect::at(x_min + 1, y_min + 1).of_size(box_w - 1, box_h - 1);
      draw_hollow_rect_mut(image, inner, Rgb(color));
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = format!("{} {:.2}", name, detection.score);
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签背景在边框上方，不超出图像边界
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = text_height as u32;

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, Rgb(color));
      draw_text_mut(
        image,
        Rgb(LABEL_TEXT_COLOR),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  [
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ]
}

/// 以文本形式记录检测结果，每行: 名称或类别编号, 分数, x1, y1, x2, y2
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn record(
    &self,
    detections: &[Detection],
    class_names: &ClassNames,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let records: Vec<String> = detections
      .iter()
      .map(|item| {
        let name = if self.label_with_name {
          class_names
            .get(item.class_id)
            .unwrap_or("unknown")
            .to_string()
        } else {
          item.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RawResult;
  use std::time::Duration;

  fn result() -> (InferenceResult, ClassNames) {
    let names: ClassNames = ["cat", "dog"].into_iter().collect();
    let raw = RawResult::PerClass(vec![
      vec![[2.0, 2.0, 10.0, 10.0, 0.9]],
      vec![[12.0, 12.0, 18.0, 18.0, 0.3]],
    ]);
    (
      InferenceResult::new(raw, Duration::ZERO, &names).unwrap(),
      names,
    )
  }

  #[test]
  fn draws_only_above_own_threshold() {
    let (result, names) = result();
    let mut image = RgbImage::new(20, 20);
    Draw::new(0.5).draw_detections(&mut image, &result, &names);

    assert_ne!(image.get_pixel(2, 2), &Rgb([0, 0, 0]));
    assert_ne!(image.get_pixel(10, 5), &Rgb([0, 0, 0]));
    // 框内部不填充
    assert_eq!(image.get_pixel(6, 6), &Rgb([0, 0, 0]));
    // 低于阈值的 dog 不绘制
    assert_eq!(image.get_pixel(12, 12), &Rgb([0, 0, 0]));
  }

  #[test]
  fn lower_threshold_draws_every_class() {
    let (result, names) = result();
    let mut image = RgbImage::new(20, 20);
    Draw::new(0.1).draw_detections(&mut image, &result, &names);
    assert_ne!(image.get_pixel(12, 12), &Rgb([0, 0, 0]));
    assert_ne!(image.get_pixel(2, 2), image.get_pixel(12, 12));
  }

  #[test]
  fn record_writes_names_or_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let (result, names) = result();
    let detections: Vec<_> = result.detections().collect();

    Record {
      label_with_name: false,
    }
    .record(&detections, &names, &path)
    .unwrap();
    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert_eq!(
      text,
      "0, 0.9000, 2.0000, 2.0000, 10.0000, 10.0000\n1, 0.3000, 12.0000, 12.0000, 18.0000, 18.0000"
    );
  }

  #[test]
  fn missing_font_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      Draw::new(0.5).with_font_file(&dir.path().join("none.ttf")),
      Err(DrawError::FontIo(..))
    ));
  }
}
