// 该文件是 SmartDetect 项目的一部分。
// tests/session.rs - 会话流程测试
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

use std::path::Path;

use image::RgbImage;
use smartdetect::{
  config::Settings,
  input::SampleImage,
  model::{ModelError, ModelKind},
  session::{Session, SessionError, SessionState},
};

fn settings_with_sample(root: &Path) -> Settings {
  let sample = SampleImage::lookup("kitchen").unwrap();
  let image = sample.image_path(root);
  std::fs::create_dir_all(image.parent().unwrap()).unwrap();
  RgbImage::new(32, 24).save(&image).unwrap();

  let config = sample.config_path(root);
  std::fs::create_dir_all(config.parent().unwrap()).unwrap();
  std::fs::write(
    &config,
    r#"{
      "model": { "type": "RepPointsDetector", "input_size": [64, 64] },
      "data": { "test": { "type": "CocoDataset" } }
    }"#,
  )
  .unwrap();

  Settings {
    root: root.to_path_buf(),
    yolo_root: root.join("yolo"),
    ..Settings::default()
  }
}

#[test]
fn missing_weights_keep_model_selection() {
  let dir = tempfile::tempdir().unwrap();
  let mut session = Session::new(settings_with_sample(dir.path())).unwrap();

  let image = session.choose_image("kitchen").unwrap();
  assert!(image.sample.is_some());
  session.choose_model(ModelKind::RepPoints).unwrap();

  let err = session.run().unwrap_err();
  assert!(matches!(
    err,
    SessionError::Model(ModelError::ModelNotFound(_))
  ));
  assert_eq!(session.state(), SessionState::ModelChosen);
  assert_eq!(session.model(), Some(ModelKind::RepPoints));
}

#[test]
fn yolov3_without_model_definition_fails_cleanly() {
  let dir = tempfile::tempdir().unwrap();
  let mut session = Session::new(settings_with_sample(dir.path())).unwrap();
  session.choose_image("sample:///kitchen").unwrap();
  session.choose_model(ModelKind::Yolov3).unwrap();

  assert!(matches!(
    session.run(),
    Err(SessionError::Model(ModelError::ConfigIo(..)))
  ));
  assert_eq!(session.state(), SessionState::ModelChosen);
}

#[test]
fn unknown_sample_is_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let mut session = Session::new(settings_with_sample(dir.path())).unwrap();
  assert!(session.choose_image("sample:///beach").is_err());
  assert_eq!(session.state(), SessionState::NoSelection);
}
