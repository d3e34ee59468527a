// 该文件是 Soushan （搜山） 项目的一部分。
// src/plugin.rs - 插件契约与描述符
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::engine::EngineError;
use crate::model::ObjectDetectionModel;

/// 插件接口版本号，api 变更意味着契约不兼容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
  pub api: u32,
  pub major: u32,
  pub minor: u32,
}

impl Version {
  pub const fn new(api: u32, major: u32, minor: u32) -> Self {
    Version { api, major, minor }
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.api, self.major, self.minor)
  }
}

/// 插件声明的推理硬件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceDevice {
  Cpu,
  CudaGpu,
  AnyGpu,
}

impl fmt::Display for InferenceDevice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InferenceDevice::Cpu => write!(f, "CPU"),
      InferenceDevice::CudaGpu => write!(f, "CUDA GPU"),
      InferenceDevice::AnyGpu => write!(f, "Any GPU"),
    }
  }
}

/// 插件支持的操作系统与架构组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlatform {
  LinuxAmd64,
  LinuxArm,
  WindowsAmd64,
  WindowsArm,
  OsxAmd64,
  OsxArm,
  AndroidArm,
  IosArm,
}

impl fmt::Display for TargetPlatform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TargetPlatform::LinuxAmd64 => "linux/amd64",
      TargetPlatform::LinuxArm => "linux/arm",
      TargetPlatform::WindowsAmd64 => "windows/amd64",
      TargetPlatform::WindowsArm => "windows/arm",
      TargetPlatform::OsxAmd64 => "osx/amd64",
      TargetPlatform::OsxArm => "osx/arm",
      TargetPlatform::AndroidArm => "android/arm",
      TargetPlatform::IosArm => "ios/arm",
    };
    write!(f, "{}", name)
  }
}

/// 插件的静态能力描述，构造后不可变
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
  /// 全局唯一标识，注册表配置以它引用插件
  pub tag: &'static str,
  pub name: &'static str,
  pub description: &'static str,
  pub author: &'static str,
  pub company: &'static str,
  pub url: &'static str,
  /// 运行时外部依赖约束，如 "CUDA == 11.6"
  pub dependences: &'static [&'static str],
  pub version: Version,
  pub inference_device: InferenceDevice,
  pub targets: &'static [TargetPlatform],
}

impl PluginDescriptor {
  /// 解析主页地址，描述符中只保存字符串字面量
  pub fn homepage(&self) -> Result<Url, url::ParseError> {
    Url::parse(self.url)
  }
}

#[derive(Error, Debug)]
pub enum PluginError {
  #[error("置信度阈值超出 [0, 1] 范围: {0}")]
  InvalidThreshold(f32),
  #[error("缺少运行时依赖: {0}")]
  MissingDependency(String),
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
}

#[cfg(feature = "onnx")]
impl PluginError {
  /// 把引擎错误映射为插件错误，执行后端缺失时报出描述符声明的依赖
  pub(crate) fn from_engine(descriptor: &PluginDescriptor, err: EngineError) -> Self {
    match err {
      EngineError::ProviderUnavailable(provider) => {
        if descriptor.dependences.is_empty() {
          PluginError::MissingDependency(provider)
        } else {
          PluginError::MissingDependency(descriptor.dependences.join(", "))
        }
      }
      other => PluginError::Engine(other),
    }
  }
}

/// 目标检测插件：携带能力描述，并按给定阈值构造检测模型。
///
/// 模型构造可能很昂贵（网络加载、会话预热），也可能因缺少硬件
/// 或运行时依赖而失败，此时必须报出具体缺失的依赖。
pub trait ObjectDetectionPlugin {
  fn descriptor(&self) -> &PluginDescriptor;

  /// 构造检测模型。阈值必须在 [0, 1] 内，超出范围直接拒绝。
  fn load_model(&self, threshold: f32) -> Result<Box<dyn ObjectDetectionModel>, PluginError>;
}

/// 所有插件共用的阈值检查
pub(crate) fn validate_threshold(threshold: f32) -> Result<f32, PluginError> {
  if !(0.0..=1.0).contains(&threshold) {
    return Err(PluginError::InvalidThreshold(threshold));
  }
  Ok(threshold)
}

mod fake;
pub use fake::FakePlugin;

#[cfg(feature = "onnx")]
mod retinanet;
#[cfg(feature = "onnx")]
pub use retinanet::RetinanetPlugin;

#[cfg(feature = "onnx")]
mod yolo5;
#[cfg(feature = "onnx")]
pub use yolo5::Yolo5Plugin;
