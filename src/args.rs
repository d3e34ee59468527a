// 该文件是 Soushan （搜山） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Soushan 搜救目标检测流水线
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 列出注册表中发现的插件
  Show {
    /// 显示完整插件信息
    #[arg(short, long)]
    all: bool,

    /// 插件注册表配置文件
    #[arg(long, value_name = "FILE", default_value = "plugins.json")]
    registry: PathBuf,
  },

  /// 用指定插件处理目录中的全部图像
  Infer {
    /// 插件序号（见 show 命令）
    #[arg(short, long, value_name = "INDEX")]
    plugin: usize,

    /// 输入图像目录
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// 输出目录
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// 置信度阈值 (0.0 - 1.0)
    #[arg(short, long, default_value = "0.5", value_name = "THRESHOLD")]
    threshold: f32,

    /// 插件注册表配置文件
    #[arg(long, value_name = "FILE", default_value = "plugins.json")]
    registry: PathBuf,

    /// 在输出图像上绘制检测框
    #[arg(long)]
    draw: bool,
  },
}
