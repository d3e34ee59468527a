// 该文件是 Soushan （搜山） 项目的一部分。
// src/plugin/retinanet.rs - Retinanet 检测插件
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

const INPUT_TENSOR: &str = "input_1";
const CANVAS: u32 = 2100;

const DESCRIPTOR_CPU: PluginDescriptor = PluginDescriptor {
  tag: "soushan.retinanet",
  name: "Soushan Retinanet",
  description: "Resnet50+deepFPN neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &[],
  version: Version::new(2, 5, 1),
  inference_device: InferenceDevice::Cpu,
  targets: &[
    TargetPlatform::LinuxAmd64,
    TargetPlatform::WindowsAmd64,
    TargetPlatform::OsxAmd64,
  ],
};

const DESCRIPTOR_CUDA: PluginDescriptor = PluginDescriptor {
  tag: "soushan.retinanet.cuda",
  name: "Soushan Retinanet",
  description: "Resnet50+deepFPN neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &["CUDA == 11.6", "CuDNN == 8.4"],
  version: Version::new(2, 5, 1),
  inference_device: InferenceDevice::CudaGpu,
  targets: &[TargetPlatform::LinuxAmd64, TargetPlatform::WindowsAmd64],
};

const DESCRIPTOR_DIRECTML: PluginDescriptor = PluginDescriptor {
  tag: "soushan.retinanet.directml",
  name: "Soushan Retinanet",
  description: "Resnet50+deepFPN neural network",
  author: "Johann Li",
  company: "ETVP",
  url: "https://github.com/Qinka/soushan",
  dependences: &["DirectX >= 12.1"],
  version: Version::new(2, 5, 1),
  inference_device: InferenceDevice::AnyGpu,
  targets: &[TargetPlatform::WindowsAmd64],
};

/// Retinanet 行人检测插件。同一份网络按声明的硬件类别选择
/// 执行后端，CPU/CUDA/DirectML 变体只在描述符上不同。
pub struct RetinanetPlugin {
  descriptor: PluginDescriptor,
  model_path: PathBuf,
}

impl RetinanetPlugin {
  pub fn new(device: InferenceDevice, model_path: impl Into<PathBuf>) -> Self {
    let descriptor = match device {
      InferenceDevice::Cpu => DESCRIPTOR_CPU,
      InferenceDevice::CudaGpu => DESCRIPTOR_CUDA,
      InferenceDevice::AnyGpu => DESCRIPTOR_DIRECTML,
    };
    RetinanetPlugin {
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
    normalize: Normalize::MeanSubBgr([103.939, 116.779, 123.68]),
    layout: TensorLayout::Nhwc,
  }
}

fn postprocess_spec() -> PostprocessSpec {
  PostprocessSpec {
    layout: RawLayout::Named {
      boxes: "Identity",
      scores: "Identity_1",
    },
    encoding: BoxEncoding::Corners,
    units: CoordUnits::CanvasPixels,
    label: "Pedestrian",
  }
}

impl ObjectDetectionPlugin for RetinanetPlugin {
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
