// 该文件是 Soushan （搜山） 项目的一部分。
// src/registry.rs - 插件注册表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::plugin::{FakePlugin, ObjectDetectionPlugin};

/// 注册表配置文件，列出启用的插件。文件中的顺序就是发现顺序，
/// 调用方按序号引用插件，文件不变则序号不变。
#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
  pub plugins: Vec<PluginEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PluginEntry {
  /// 插件标识，见各插件描述符
  pub tag: String,
  /// 模型权重文件路径，假插件不需要
  #[serde(default)]
  pub model: Option<PathBuf>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("注册表配置读取失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("注册表配置解析失败: {0}")]
  Parse(#[from] serde_json::Error),
}

/// 启动时从配置一次性填充的插件注册表，之后只读。
pub struct PluginRegistry {
  plugins: Vec<Box<dyn ObjectDetectionPlugin>>,
}

/// 需要 onnx 特性的内建插件标识
const ONNX_TAGS: [&str; 6] = [
  "soushan.retinanet",
  "soushan.retinanet.cuda",
  "soushan.retinanet.directml",
  "soushan.yolo5",
  "soushan.yolo5.cuda",
  "soushan.yolo5.directml",
];

impl PluginRegistry {
  /// 读取配置并实例化每个插件。单个插件失败只记录警告并跳过，
  /// 不影响其余插件；配置本身不可读才是错误。
  pub fn discover(config_path: &Path) -> Result<Self, RegistryError> {
    let text = std::fs::read_to_string(config_path)?;
    let config: RegistryConfig = serde_json::from_str(&text)?;

    let mut plugins: Vec<Box<dyn ObjectDetectionPlugin>> = Vec::new();
    for entry in &config.plugins {
      match instantiate(entry) {
        Ok(plugin) => {
          debug!("发现插件: {}", plugin.descriptor().tag);
          plugins.push(plugin);
        }
        Err(reason) => {
          warn!("跳过插件 {}: {}", entry.tag, reason);
        }
      }
    }

    if plugins.is_empty() {
      warn!("未发现任何可用插件");
    }

    Ok(PluginRegistry { plugins })
  }

  pub fn plugins(&self) -> &[Box<dyn ObjectDetectionPlugin>] {
    &self.plugins
  }

  pub fn get(&self, index: usize) -> Option<&dyn ObjectDetectionPlugin> {
    self.plugins.get(index).map(|plugin| plugin.as_ref())
  }

  pub fn len(&self) -> usize {
    self.plugins.len()
  }

  pub fn is_empty(&self) -> bool {
    self.plugins.is_empty()
  }
}

fn instantiate(entry: &PluginEntry) -> Result<Box<dyn ObjectDetectionPlugin>, String> {
  if entry.tag == FakePlugin::TAG {
    return Ok(Box::new(FakePlugin));
  }

  if ONNX_TAGS.contains(&entry.tag.as_str()) {
    return instantiate_onnx(entry);
  }

  Err(format!("未知插件标识: {}", entry.tag))
}

#[cfg(feature = "onnx")]
fn instantiate_onnx(entry: &PluginEntry) -> Result<Box<dyn ObjectDetectionPlugin>, String> {
  use crate::plugin::{InferenceDevice, RetinanetPlugin, Yolo5Plugin};

  let model = entry
    .model
    .clone()
    .ok_or_else(|| "配置缺少 model 字段".to_string())?;

  let device = if entry.tag.ends_with(".cuda") {
    InferenceDevice::CudaGpu
  } else if entry.tag.ends_with(".directml") {
    InferenceDevice::AnyGpu
  } else {
    InferenceDevice::Cpu
  };

  if entry.tag.starts_with("soushan.retinanet") {
    Ok(Box::new(RetinanetPlugin::new(device, model)))
  } else {
    Ok(Box::new(Yolo5Plugin::new(device, model)))
  }
}

#[cfg(not(feature = "onnx"))]
fn instantiate_onnx(_entry: &PluginEntry) -> Result<Box<dyn ObjectDetectionPlugin>, String> {
  Err("onnx 特性未编译，插件不可用".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
  }

  #[test]
  fn discovery_order_matches_config_order_and_is_stable() {
    let config = write_config(
      r#"{"plugins": [{"tag": "soushan.fake"}, {"tag": "soushan.fake"}]}"#,
    );

    let first = PluginRegistry::discover(config.path()).unwrap();
    let second = PluginRegistry::discover(config.path()).unwrap();

    let tags = |registry: &PluginRegistry| -> Vec<&'static str> {
      registry
        .plugins()
        .iter()
        .map(|plugin| plugin.descriptor().tag)
        .collect()
    };
    assert_eq!(tags(&first), tags(&second));
    assert_eq!(first.len(), 2);
  }

  #[test]
  fn unknown_tag_is_skipped_not_fatal() {
    let config = write_config(
      r#"{"plugins": [{"tag": "soushan.unknown"}, {"tag": "soushan.fake"}]}"#,
    );
    let registry = PluginRegistry::discover(config.path()).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(0).unwrap().descriptor().tag, FakePlugin::TAG);
  }

  #[test]
  fn empty_config_yields_empty_registry() {
    let config = write_config(r#"{"plugins": []}"#);
    let registry = PluginRegistry::discover(config.path()).unwrap();
    assert!(registry.is_empty());
    assert!(registry.get(0).is_none());
  }

  #[test]
  fn missing_config_file_is_an_error() {
    let result = PluginRegistry::discover(Path::new("does-not-exist.json"));
    assert!(matches!(result, Err(RegistryError::Io(_))));
  }

  #[cfg(not(feature = "onnx"))]
  #[test]
  fn onnx_plugin_without_feature_is_skipped() {
    let config = write_config(
      r#"{"plugins": [{"tag": "soushan.retinanet", "model": "m.onnx"}, {"tag": "soushan.fake"}]}"#,
    );
    let registry = PluginRegistry::discover(config.path()).unwrap();
    assert_eq!(registry.len(), 1);
  }
}
