// 该文件是 Soushan （搜山） 项目的一部分。
// src/plugin/fake.rs - 假插件
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::{Detection, ModelError, ObjectDetectionModel};
use crate::plugin::{
  InferenceDevice, ObjectDetectionPlugin, PluginDescriptor, PluginError, TargetPlatform, Version,
  validate_threshold,
};

const FAKE_DESCRIPTOR: PluginDescriptor = PluginDescriptor {
  tag: "soushan.fake",
  name: "Fake Plugin",
  description: "Fixed-output plugin for pipeline testing",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &[],
  version: Version::new(2, 1, 0),
  inference_device: InferenceDevice::Cpu,
  targets: &[
    TargetPlatform::LinuxAmd64,
    TargetPlatform::LinuxArm,
    TargetPlatform::WindowsAmd64,
    TargetPlatform::OsxAmd64,
    TargetPlatform::OsxArm,
  ],
};

/// 不依赖任何推理引擎的插件，返回固定的检测结果，
/// 用于流水线联调和测试。
#[derive(Debug, Default)]
pub struct FakePlugin;

impl FakePlugin {
  pub const TAG: &'static str = "soushan.fake";
}

impl ObjectDetectionPlugin for FakePlugin {
  fn descriptor(&self) -> &PluginDescriptor {
    &FAKE_DESCRIPTOR
  }

  fn load_model(&self, threshold: f32) -> Result<Box<dyn ObjectDetectionModel>, PluginError> {
    let threshold = validate_threshold(threshold)?;
    Ok(Box::new(FakeModel {
      threshold,
      closed: AtomicBool::new(false),
    }))
  }
}

struct FakeModel {
  threshold: f32,
  closed: AtomicBool,
}

fn fake_object(score: f32, x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Detection {
  Detection {
    label: "FakeObject".to_string(),
    score,
    x_min,
    y_min,
    x_max,
    y_max,
  }
}

impl ObjectDetectionModel for FakeModel {
  fn infer(
    &self,
    _image_path: &Path,
    _width: u32,
    _height: u32,
  ) -> Result<Vec<Detection>, ModelError> {
    if self.closed.load(Ordering::SeqCst) {
      return Err(ModelError::Disposed);
    }

    let objects = [
      fake_object(0.5, 10, 20, 100, 200),
      fake_object(0.95, 5, 2, 50, 20),
    ];

    Ok(
      objects
        .into_iter()
        .filter(|object| object.score >= self.threshold)
        .collect(),
    )
  }

  fn close(&self) {
    self.closed.store(true, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptor_reports_cpu_device() {
    let plugin = FakePlugin;
    assert_eq!(plugin.descriptor().tag, FakePlugin::TAG);
    assert_eq!(plugin.descriptor().inference_device, InferenceDevice::Cpu);
    assert!(plugin.descriptor().homepage().is_ok());
  }

  #[test]
  fn out_of_range_threshold_is_rejected() {
    let plugin = FakePlugin;
    assert!(matches!(
      plugin.load_model(1.5),
      Err(PluginError::InvalidThreshold(_))
    ));
    assert!(matches!(
      plugin.load_model(-0.1),
      Err(PluginError::InvalidThreshold(_))
    ));
  }

  #[test]
  fn threshold_filters_fixed_objects() {
    let plugin = FakePlugin;
    let model = plugin.load_model(0.9).unwrap();
    let detections = model.infer(Path::new("unused.jpg"), 640, 480).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].score, 0.95);
  }

  #[test]
  fn infer_after_close_fails_loudly() {
    let plugin = FakePlugin;
    let model = plugin.load_model(0.5).unwrap();
    model.close();
    assert!(matches!(
      model.infer(Path::new("unused.jpg"), 640, 480),
      Err(ModelError::Disposed)
    ));
  }
}
