// 该文件是 Soushan （搜山） 项目的一部分。
// src/plugin/yolo5.rs - YOLO v5 检测插件
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use tracing::info;

use crate::engine::EngineSession;
use crate::model::{ObjectDetectionModel, PipelineModel};
use crate::plugin::{
  InferenceDevice, ObjectDetectionPlugin, PluginDescriptor, PluginError, TargetPlatform, Version,
  validate_threshold,
};
use crate::postprocess::{BoxEncoding, CoordUnits, PostprocessSpec, RawLayout};
use crate::preprocess::{Normalize, Placement, PreprocessSpec, TensorLayout};

const INPUT_TENSOR: &str = "x";
const CANVAS: u32 = 1984;

const DESCRIPTOR_CPU: PluginDescriptor = PluginDescriptor {
  tag: "soushan.yolo5",
  name: "Soushan YOLO v5",
  description: "YOLO v5 neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &[],
  version: Version::new(2, 1, 0),
  inference_device: InferenceDevice::Cpu,
  targets: &[
    TargetPlatform::LinuxAmd64,
    TargetPlatform::WindowsAmd64,
    TargetPlatform::OsxAmd64,
  ],
};

const DESCRIPTOR_CUDA: PluginDescriptor = PluginDescriptor {
  tag: "soushan.yolo5.cuda",
  name: "Soushan YOLO v5",
  description: "YOLO v5 neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &["CUDA == 11.6", "CuDNN == 8.4"],
  version: Version::new(2, 1, 0),
  inference_device: InferenceDevice::CudaGpu,
  targets: &[TargetPlatform::LinuxAmd64, TargetPlatform::WindowsAmd64],
};

const DESCRIPTOR_DIRECTML: PluginDescriptor = PluginDescriptor {
  tag: "soushan.yolo5.directml",
  name: "Soushan YOLO v5",
  description: "YOLO v5 neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &["DirectX >= 12.1"],
  version: Version::new(2, 1, 0),
  inference_device: InferenceDevice::AnyGpu,
  targets: &[TargetPlatform::WindowsAmd64],
};

/// YOLO v5 行人检测插件。网络自带 NMS 头，输出归一化角点框、
/// 得分与有效检测数，按位置取用。
pub struct Yolo5Plugin {
  descriptor: PluginDescriptor,
  model_path: PathBuf,
}

impl Yolo5Plugin {
  pub fn new(device: InferenceDevice, model_path: impl Into<PathBuf>) -> Self {
    let descriptor = match device {
      InferenceDevice::Cpu => DESCRIPTOR_CPU,
      InferenceDevice::CudaGpu => DESCRIPTOR_CUDA,
      InferenceDevice::AnyGpu => DESCRIPTOR_DIRECTML,
    };
    Yolo5Plugin {
      descriptor,
      model_path: model_path.into(),
    }
  }
}

fn preprocess_spec() -> PreprocessSpec {
  PreprocessSpec {
    canvas: CANVAS,
    fill: [128, 128, 128],
    placement: Placement::Centered,
    normalize: Normalize::Scale255,
    layout: TensorLayout::Nhwc,
  }
}

fn postprocess_spec() -> PostprocessSpec {
  PostprocessSpec {
    layout: RawLayout::IndexedWithCount {
      boxes: 0,
      scores: 1,
      count: 3,
    },
    encoding: BoxEncoding::Corners,
    units: CoordUnits::Normalized,
    label: "Pedestrian",
  }
}

impl ObjectDetectionPlugin for Yolo5Plugin {
  fn descriptor(&self) -> &PluginDescriptor {
    &self.descriptor
  }

  fn load_model(&self, threshold: f32) -> Result<Box<dyn ObjectDetectionModel>, PluginError> {
    let threshold = validate_threshold(threshold)?;

    info!("加载 {} 模型: {}", self.descriptor.name, self.model_path.display());
    let session = EngineSession::load(&self.model_path, self.descriptor.inference_device)
      .map_err(|e| PluginError::from_engine(&self.descriptor, e))?;

    Ok(Box::new(PipelineModel::new(
      session,
      INPUT_TENSOR,
      preprocess_spec(),
      postprocess_spec(),
      threshold,
    )))
  }
}
