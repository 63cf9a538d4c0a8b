// 该文件是 SmartDetect 项目的一部分。
// src/session.rs - 前端会话状态
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

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  config::Settings,
  input::{ImageCache, ImageCacheError, InputError, InputWrapper, ResolvedImage},
  model::{Detected, Detector, ImageInput, ModelError, ModelKind},
  output::{Draw, DrawError, Presentation, Presenter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  NoSelection,
  ImageChosen,
  ModelChosen,
  InferenceRunning,
  ResultDisplayed,
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("图片错误: {0}")]
  Input(#[from] InputError),
  #[error("图片缓存错误: {0}")]
  Cache(#[from] ImageCacheError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("绘制错误: {0}")]
  Draw(#[from] DrawError),
  #[error("请先选择图片")]
  NoImage,
  #[error("当前状态 {0:?} 下无法开始推理")]
  NotReady(SessionState),
}

/// 一次推理的完整结果
#[derive(Debug, Clone)]
pub struct Outcome {
  pub model: ModelKind,
  pub source: RgbImage,
  pub detected: Detected,
  pub presentation: Presentation,
}

/// 前端会话
///
/// 选择图片 -> 选择模型 -> 推理 -> 展示。下载的图片与中间结果都放在会话自己的临时目录中。
pub struct Session {
  settings: Settings,
  cache: ImageCache,
  presenter: Presenter,
  state: SessionState,
  image: Option<ResolvedImage>,
  model: Option<ModelKind>,
  outcome: Option<Outcome>,
}

impl Session {
  pub fn new(settings: Settings) -> Result<Self, SessionError> {
    let mut draw = Draw::new(settings.score_threshold);
    if let Some(font) = settings.font.as_deref() {
      draw = draw.with_font_file(font)?;
    }
    Ok(Self {
      cache: ImageCache::new()?,
      presenter: Presenter::new(draw),
      settings,
      state: SessionState::NoSelection,
      image: None,
      model: None,
      outcome: None,
    })
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn image(&self) -> Option<&ResolvedImage> {
    self.image.as_ref()
  }

  pub fn model(&self) -> Option<ModelKind> {
    self.model
  }

  pub fn outcome(&self) -> Option<&Outcome> {
    self.outcome.as_ref()
  }

  /// 选择新图片，之前的模型选择与结果被清除
  pub fn choose_image(&mut self, selection: &str) -> Result<&ResolvedImage, SessionError> {
    let input = InputWrapper::parse(selection, &self.settings.default_url)?;
    let resolved = input.resolve(&self.settings.root, &self.cache)?;
    info!("已选择图片: {}", resolved.path.display());

    self.model = None;
    self.outcome = None;
    self.state = SessionState::ImageChosen;
    Ok(self.image.insert(resolved))
  }

  pub fn clear_image(&mut self) {
    self.image = None;
    self.model = None;
    self.outcome = None;
    self.state = SessionState::NoSelection;
  }

  pub fn choose_model(&mut self, model: ModelKind) -> Result<(), SessionError> {
    if self.image.is_none() {
      warn!("未选择图片，忽略模型选择 {}", model.name());
      return Err(SessionError::NoImage);
    }
    info!("已选择模型: {}", model.name());
    self.model = Some(model);
    self.state = SessionState::ModelChosen;
    Ok(())
  }

  /// 使用所选模型推理
  pub fn run(&mut self) -> Result<&Outcome, SessionError> {
    let model = self.model.ok_or(SessionError::NotReady(self.state))?;
    let detector = model.detector(self.cache.path())?;
    self.run_with(detector.as_ref())
  }

  /// 使用给定检测器推理，失败时回到 ModelChosen
  pub fn run_with(&mut self, detector: &dyn Detector) -> Result<&Outcome, SessionError> {
    if !matches!(
      self.state,
      SessionState::ModelChosen | SessionState::ResultDisplayed
    ) {
      return Err(SessionError::NotReady(self.state));
    }
    let (Some(image), Some(model)) = (self.image.as_ref(), self.model) else {
      return Err(SessionError::NotReady(self.state));
    };

    self.state = SessionState::InferenceRunning;
    let result = Self::infer(&self.settings, &self.presenter, image, model, detector);
    match result {
      Ok(outcome) => {
        self.state = SessionState::ResultDisplayed;
        Ok(self.outcome.insert(outcome))
      }
      Err(e) => {
        error!("推理失败: {}", e);
        self.state = SessionState::ModelChosen;
        Err(e)
      }
    }
  }

  fn infer(
    settings: &Settings,
    presenter: &Presenter,
    image: &ResolvedImage,
    model: ModelKind,
    detector: &dyn Detector,
  ) -> Result<Outcome, SessionError> {
    let source = image.load()?;
    let config = model.model_config(settings, image.sample);
    info!("使用 {} 检测 {}", detector.name(), image.path.display());

    let detected = detector.run(ImageInput::Image(&source), &config)?;
    let presentation = presenter.present(
      &source,
      &detected.result,
      &detected.class_names,
      settings.score_threshold,
    );
    Ok(Outcome {
      model,
      source,
      detected,
      presentation,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ClassNames, InferenceResult, ModelConfig, RawResult};
  use std::{path::Path, time::Duration};

  struct FixedDetector(Option<RawResult>);

  impl Detector for FixedDetector {
    fn name(&self) -> &'static str {
      "fixed"
    }

    fn run(&self, _image: ImageInput<'_>, _config: &ModelConfig) -> Result<Detected, ModelError> {
      let raw = self
        .0
        .clone()
        .ok_or_else(|| ModelError::InvalidOutput("没有结果".to_string()))?;
      let class_names: ClassNames = ["cat", "dog"].into_iter().collect();
      Ok(Detected {
        result: InferenceResult::new(raw, Duration::from_millis(3), &class_names)?,
        class_names,
      })
    }
  }

  fn session_with_image(dir: &Path) -> Session {
    let path = dir.join("photo.png");
    RgbImage::new(16, 16).save(&path).unwrap();
    let mut session = Session::new(Settings::default()).unwrap();
    session
      .choose_image(&format!("image://{}", path.display()))
      .unwrap();
    session
  }

  #[test]
  fn model_requires_image() {
    let mut session = Session::new(Settings::default()).unwrap();
    assert!(matches!(
      session.choose_model(ModelKind::Yolov3),
      Err(SessionError::NoImage)
    ));
    assert_eq!(session.state(), SessionState::NoSelection);
  }

  #[test]
  fn run_requires_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with_image(dir.path());
    assert_eq!(session.state(), SessionState::ImageChosen);
    assert!(matches!(
      session.run_with(&FixedDetector(None)),
      Err(SessionError::NotReady(SessionState::ImageChosen))
    ));
  }

  #[test]
  fn successful_run_displays_result() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with_image(dir.path());
    session.choose_model(ModelKind::RepPoints).unwrap();

    let raw = RawResult::PerClass(vec![
      vec![[0.0, 0.0, 10.0, 10.0, 0.9]],
      vec![[0.0, 0.0, 5.0, 5.0, 0.2]],
    ]);
    let outcome = session.run_with(&FixedDetector(Some(raw))).unwrap();
    assert_eq!(
      outcome.presentation.report,
      vec!["Label: cat, Confidence: 90.00%".to_string()]
    );
    assert_eq!(session.state(), SessionState::ResultDisplayed);

    // 重新选择图片回到 ImageChosen
    let path = dir.path().join("photo.png");
    session
      .choose_image(&format!("image://{}", path.display()))
      .unwrap();
    assert_eq!(session.state(), SessionState::ImageChosen);
    assert!(session.outcome().is_none());
    assert!(session.model().is_none());
  }

  #[test]
  fn failed_run_returns_to_model_chosen() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with_image(dir.path());
    session.choose_model(ModelKind::Yolov3).unwrap();
    assert!(session.run_with(&FixedDetector(None)).is_err());
    assert_eq!(session.state(), SessionState::ModelChosen);

    session.clear_image();
    assert_eq!(session.state(), SessionState::NoSelection);
  }
}
