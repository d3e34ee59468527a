// 该文件是 Soushan （搜山） 项目的一部分。
// src/model.rs - 检测模型契约与推理流水线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::engine::EngineError;

/// 最终的检测结果，坐标为原图像素，已过滤并完成聚类合并
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub score: f32,
  pub x_min: u32,
  pub y_min: u32,
  pub x_max: u32,
  pub y_max: u32,
}

impl Detection {
  pub fn width(&self) -> u32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> u32 {
    self.y_max - self.y_min
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型已释放")]
  Disposed,
  #[error("图像读取错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
}

/// 检测模型：独占一个推理引擎会话的有状态对象。
///
/// `infer` 可以调用任意多次，除固定阈值外调用之间不保留状态；
/// 传入的宽高必须与图像真实尺寸一致，模型不做校验，不一致会
/// 静默破坏坐标映射。`close` 释放底层会话，之后的 `infer` 以
/// `ModelError::Disposed` 失败；未显式关闭时随析构释放。
/// 同一实例不保证并发调用安全，调用期间由调用方独占。
pub trait ObjectDetectionModel: Send + Sync {
  fn infer(
    &self,
    image_path: &Path,
    width: u32,
    height: u32,
  ) -> Result<Vec<Detection>, ModelError>;

  fn close(&self);
}

/// `infer` 的异步变体：把同步推理移到后台线程执行，语义与
/// `infer` 完全一致，开始后不可取消。
pub fn infer_detached(
  model: Arc<dyn ObjectDetectionModel>,
  image_path: PathBuf,
  width: u32,
  height: u32,
) -> JoinHandle<Result<Vec<Detection>, ModelError>> {
  std::thread::spawn(move || model.infer(&image_path, width, height))
}

#[cfg(feature = "onnx")]
pub use pipeline::PipelineModel;

#[cfg(feature = "onnx")]
mod pipeline {
  use std::path::Path;
  use std::sync::Mutex;
  use std::time::Instant;

  use tracing::{debug, info};

  use super::{Detection, ModelError, ObjectDetectionModel};
  use crate::engine::EngineSession;
  use crate::postprocess::{self, PostprocessSpec};
  use crate::preprocess::{self, PreprocessSpec};

  /// 单图推理流水线：读取几何信息 → 预处理成模型输入 →
  /// 调用引擎 → 把原始输出解码、过滤、映射、合并成最终检测。
  /// 各插件只在预处理与后处理参数上不同，流水线本身共用。
  pub struct PipelineModel {
    session: Mutex<Option<EngineSession>>,
    input_name: &'static str,
    preprocess: PreprocessSpec,
    postprocess: PostprocessSpec,
    threshold: f32,
  }

  impl PipelineModel {
    pub fn new(
      session: EngineSession,
      input_name: &'static str,
      preprocess: PreprocessSpec,
      postprocess: PostprocessSpec,
      threshold: f32,
    ) -> Self {
      PipelineModel {
        session: Mutex::new(Some(session)),
        input_name,
        preprocess,
        postprocess,
        threshold,
      }
    }
  }

  impl ObjectDetectionModel for PipelineModel {
    fn infer(
      &self,
      image_path: &Path,
      width: u32,
      height: u32,
    ) -> Result<Vec<Detection>, ModelError> {
      let mut guard = self.session.lock().unwrap();
      let session = guard.as_mut().ok_or(ModelError::Disposed)?;

      debug!("解码图像: {}", image_path.display());
      let image = image::open(image_path)?.to_rgb8();

      let start = Instant::now();
      let (tensor, transform) = preprocess::letterbox(&image, &self.preprocess);
      debug!("预处理耗时: {:.2?}", start.elapsed());

      let outputs = session.run(self.input_name, tensor)?;

      let candidates = postprocess::decode_outputs(&outputs, &self.postprocess)?;
      debug!("原始候选 {} 个", candidates.len());

      Ok(postprocess::resolve(
        candidates,
        &self.postprocess,
        &transform,
        self.preprocess.canvas,
        width,
        height,
        self.threshold,
      ))
    }

    fn close(&self) {
      let mut guard = self.session.lock().unwrap();
      if guard.take().is_some() {
        info!("推理会话已释放");
      }
    }
  }
}
