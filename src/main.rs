// 该文件是 Soushan （搜山） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info, warn};

use soushan::output::write_outputs;
use soushan::registry::PluginRegistry;

/// 支持的图像扩展名
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  match args.command {
    args::Command::Show { all, registry } => show_plugins(&registry, all),
    args::Command::Infer {
      plugin,
      input,
      output,
      threshold,
      registry,
      draw,
    } => run_infer(plugin, &input, &output, threshold, &registry, draw),
  }
}

fn show_plugins(config: &Path, all: bool) -> Result<()> {
  let registry = PluginRegistry::discover(config)?;
  println!("在 {} 中发现 {} 个插件", config.display(), registry.len());

  for (index, plugin) in registry.plugins().iter().enumerate() {
    let descriptor = plugin.descriptor();
    if all {
      println!("插件 [{}] 信息:", index);
      println!("  标识: {}", descriptor.tag);
      println!("  名称: {}", descriptor.name);
      println!("  描述: {}", descriptor.description);
      println!("  作者: {} ({})", descriptor.author, descriptor.company);
      println!("  主页: {}", descriptor.url);
      println!("  版本: {}", descriptor.version);
      println!("  推理设备: {}", descriptor.inference_device);
      let targets = descriptor
        .targets
        .iter()
        .map(|target| target.to_string())
        .collect::<Vec<_>>()
        .join(" ");
      println!("  支持平台: {}", targets);
      if !descriptor.dependences.is_empty() {
        println!("  运行依赖: {}", descriptor.dependences.join(", "));
      }
    } else {
      println!("[{}]: {} - {}", index, descriptor.name, descriptor.inference_device);
    }
  }

  Ok(())
}

fn run_infer(
  plugin_index: usize,
  input: &Path,
  output: &Path,
  threshold: f32,
  config: &Path,
  draw: bool,
) -> Result<()> {
  if !input.is_dir() {
    bail!("输入目录无效: {}", input.display());
  }
  if !output.is_dir() {
    bail!("输出目录无效: {}", output.display());
  }

  let registry = PluginRegistry::discover(config)?;
  if registry.is_empty() {
    bail!("注册表 {} 中没有可用插件", config.display());
  }
  let plugin = registry.get(plugin_index).ok_or_else(|| {
    anyhow!(
      "插件序号 {} 不存在，使用 show 查看可用插件",
      plugin_index
    )
  })?;

  let descriptor = plugin.descriptor();
  println!("插件信息:");
  println!("  名称: {}", descriptor.name);
  println!("  描述: {}", descriptor.description);
  println!("  版本: {}", descriptor.version);
  println!("  推理设备: {}", descriptor.inference_device);
  println!("  置信度阈值: {}", threshold);
  println!();

  info!("正在加载模型...");
  let model = plugin.load_model(threshold)?;
  info!("模型加载完成");

  let interrupted = Arc::new(AtomicBool::new(false));
  {
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
      flag.store(true, Ordering::SeqCst);
    })?;
  }

  let images = collect_images(input)?;
  info!("发现 {} 张待处理图像", images.len());

  let mut processed = 0usize;
  let mut failed = 0usize;
  let mut total_detections = 0usize;

  for image_path in &images {
    if interrupted.load(Ordering::SeqCst) {
      warn!("收到中断信号，停止处理");
      break;
    }

    // 尺寸来自图像元数据，不做完整解码
    let (width, height) = match image::image_dimensions(image_path) {
      Ok(dimensions) => dimensions,
      Err(e) => {
        error!("无法读取图像尺寸 {}: {}", image_path.display(), e);
        failed += 1;
        continue;
      }
    };

    info!("处理图像 {} [{}x{}]", image_path.display(), width, height);
    let start = Instant::now();
    let detections = match model.infer(image_path, width, height) {
      Ok(detections) => detections,
      Err(e) => {
        error!("推理失败 {}: {}", image_path.display(), e);
        failed += 1;
        continue;
      }
    };
    info!(
      "检测到 {} 个目标，耗时 {:.2?}",
      detections.len(),
      start.elapsed()
    );

    for detection in &detections {
      println!(
        "{}: [{}, {}, {}, {}] @ {:.3}",
        detection.label,
        detection.x_min,
        detection.y_min,
        detection.x_max,
        detection.y_max,
        detection.score
      );
    }

    match write_outputs(image_path, output, &detections, width, height, draw) {
      Ok(_) => {
        processed += 1;
        total_detections += detections.len();
      }
      Err(e) => {
        error!("输出写入失败 {}: {}", image_path.display(), e);
        failed += 1;
      }
    }
  }

  model.close();

  println!();
  println!("处理完成!");
  println!("  处理图像: {}", processed);
  println!("  检测总数: {}", total_detections);
  if failed > 0 {
    println!("  失败图像: {}", failed);
  }

  Ok(())
}

/// 列出目录下的图像文件，按文件名排序保证批处理顺序稳定
fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
  let mut images = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if !path.is_file() {
      continue;
    }
    let matched = path
      .extension()
      .and_then(|extension| extension.to_str())
      .map(|extension| {
        let extension = extension.to_lowercase();
        IMAGE_EXTENSIONS.contains(&extension.as_str())
      })
      .unwrap_or(false);
    if matched {
      images.push(path);
    }
  }
  images.sort();
  Ok(images)
}
