// 该文件是 Soushan （搜山） 项目的一部分。
// src/engine.rs - 推理引擎会话封装
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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("执行后端不可用: {0}")]
  ProviderUnavailable(String),
  #[error("输出张量缺失: {0}")]
  MissingOutput(String),
  #[error("输出张量形状或类型不符: {0}")]
  ShapeMismatch(String),
  #[cfg(feature = "onnx")]
  #[error("推理会话错误: {0}")]
  Session(#[from] ort::Error),
}

/// 引擎输出的单个张量，推理结束后即与会话脱离
#[derive(Debug, Clone)]
pub enum TensorData {
  F32 { shape: Vec<usize>, data: Vec<f32> },
  I32 { shape: Vec<usize>, data: Vec<i32> },
  I64 { shape: Vec<usize>, data: Vec<i64> },
}

impl TensorData {
  pub fn as_f32(&self) -> Option<(&[usize], &[f32])> {
    match self {
      TensorData::F32 { shape, data } => Some((shape, data)),
      _ => None,
    }
  }

  /// 第一个元素按整数读取，用于 "有效检测数" 一类的计数张量
  pub fn first_as_i64(&self) -> Option<i64> {
    match self {
      TensorData::F32 { data, .. } => data.first().map(|v| *v as i64),
      TensorData::I32 { data, .. } => data.first().map(|v| *v as i64),
      TensorData::I64 { data, .. } => data.first().copied(),
    }
  }
}

/// 一次推理调用的全部输出，可按名称或位置取用
#[derive(Debug, Clone)]
pub struct EngineOutputs {
  tensors: Vec<(String, TensorData)>,
}

impl EngineOutputs {
  pub fn new(tensors: Vec<(String, TensorData)>) -> Self {
    EngineOutputs { tensors }
  }

  pub fn by_name(&self, name: &str) -> Option<&TensorData> {
    self
      .tensors
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, t)| t)
  }

  pub fn by_index(&self, index: usize) -> Option<&TensorData> {
    self.tensors.get(index).map(|(_, t)| t)
  }

  pub fn len(&self) -> usize {
    self.tensors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tensors.is_empty()
  }
}

#[cfg(feature = "onnx")]
pub use session::EngineSession;

#[cfg(feature = "onnx")]
mod session {
  use std::path::Path;

  use ndarray::Array4;
  use ort::execution_providers::CPUExecutionProvider;
  #[cfg(feature = "onnx-cuda")]
  use ort::execution_providers::CUDAExecutionProvider;
  #[cfg(feature = "onnx-directml")]
  use ort::execution_providers::DirectMLExecutionProvider;
  use ort::session::Session;
  use ort::session::builder::GraphOptimizationLevel;
  use tracing::{debug, info};

  use super::{EngineError, EngineOutputs, TensorData};
  use crate::plugin::InferenceDevice;

  /// 推理引擎会话。加载序列化的模型图，按名称绑定输入张量，
  /// 运行后取回全部输出；析构时释放原生资源。
  pub struct EngineSession {
    session: Session,
    output_names: Vec<String>,
  }

  impl EngineSession {
    pub fn load(model_path: &Path, device: InferenceDevice) -> Result<Self, EngineError> {
      if !model_path.is_file() {
        return Err(EngineError::ModelNotFound(
          model_path.display().to_string(),
        ));
      }

      info!("加载模型文件: {}", model_path.display());
      let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?;

      let builder = match device {
        InferenceDevice::Cpu => {
          builder.with_execution_providers([CPUExecutionProvider::default().build()])?
        }
        InferenceDevice::CudaGpu => {
          #[cfg(feature = "onnx-cuda")]
          {
            builder.with_execution_providers([
              CUDAExecutionProvider::default().build().error_on_failure(),
            ])?
          }
          #[cfg(not(feature = "onnx-cuda"))]
          {
            let _ = builder;
            return Err(EngineError::ProviderUnavailable(
              "CUDA (未启用 onnx-cuda 特性)".to_string(),
            ));
          }
        }
        InferenceDevice::AnyGpu => {
          #[cfg(feature = "onnx-directml")]
          {
            builder.with_execution_providers([
              DirectMLExecutionProvider::default().build().error_on_failure(),
            ])?
          }
          #[cfg(not(feature = "onnx-directml"))]
          {
            let _ = builder;
            return Err(EngineError::ProviderUnavailable(
              "DirectML (未启用 onnx-directml 特性)".to_string(),
            ));
          }
        }
      };

      let session = builder.commit_from_file(model_path).map_err(|e| match device {
        InferenceDevice::Cpu => EngineError::Session(e),
        other => EngineError::ProviderUnavailable(format!("{}: {}", other, e)),
      })?;

      let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
      debug!("模型输出张量: {:?}", output_names);

      Ok(EngineSession {
        session,
        output_names,
      })
    }

    /// 执行一次推理。调用期间会话为调用方独占。
    pub fn run(
      &mut self,
      input_name: &str,
      input: Array4<f32>,
    ) -> Result<EngineOutputs, EngineError> {
      let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
      let (data, _) = input.into_raw_vec_and_offset();
      let value = ort::value::Tensor::from_array((shape, data))?;

      debug!("执行模型推理");
      let outputs = self.session.run(ort::inputs![input_name => value])?;

      let mut tensors = Vec::with_capacity(self.output_names.len());
      for name in &self.output_names {
        let value = outputs
          .get(name.as_str())
          .ok_or_else(|| EngineError::MissingOutput(name.clone()))?;

        let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
          TensorData::F32 {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
          }
        } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
          TensorData::I32 {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
          }
        } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
          TensorData::I64 {
            shape: shape.iter().map(|&d| d as usize).collect(),
            data: data.to_vec(),
          }
        } else {
          return Err(EngineError::ShapeMismatch(name.clone()));
        };

        tensors.push((name.clone(), tensor));
      }

      Ok(EngineOutputs::new(tensors))
    }
  }
}
