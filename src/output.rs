// 该文件是 Soushan （搜山） 项目的一部分。
// src/output.rs - 按图输出写入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

use crate::annotation::Annotation;
use crate::model::Detection;

// 检测框颜色
const BOX_COLOR: [u8; 3] = [0, 0, 255];
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("输出文件名无效: {0}")]
  InvalidName(PathBuf),
}

/// 一张图像写出的两个文件
#[derive(Debug, Clone)]
pub struct ImageOutputs {
  pub image_path: PathBuf,
  pub annotation_path: PathBuf,
}

/// 把处理完的图像写入输出目录：原图拷贝（可选画框）加上
/// 同名 XML 标注。任一步失败都不会留下半成品标注。
pub fn write_outputs(
  image_path: &Path,
  output_dir: &Path,
  detections: &[Detection],
  width: u32,
  height: u32,
  draw: bool,
) -> Result<ImageOutputs, OutputError> {
  let name = image_path
    .file_name()
    .ok_or_else(|| OutputError::InvalidName(image_path.to_path_buf()))?;
  let out_image = output_dir.join(name);

  if draw && !detections.is_empty() {
    let mut image = image::open(image_path)?.to_rgb8();
    draw_detections(&mut image, detections);
    image.save(&out_image)?;
  } else {
    std::fs::copy(image_path, &out_image)?;
  }

  // 标注是拷贝文件的同名兄弟文件: xxx.jpg -> xxx.jpg.xml
  let mut annotation_name = out_image.as_os_str().to_owned();
  annotation_name.push(".xml");
  let annotation_path = PathBuf::from(annotation_name);

  let annotation = Annotation::from_detections(detections, width, height, &out_image);
  annotation.save_to_xml(&annotation_path)?;

  debug!(
    "输出写入: {} / {}",
    out_image.display(),
    annotation_path.display()
  );

  Ok(ImageOutputs {
    image_path: out_image,
    annotation_path,
  })
}

/// 在图像上绘制检测框，边框两像素
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
  for detection in detections {
    for inset in 0..BOX_THICKNESS {
      if detection.width() <= 2 * inset || detection.height() <= 2 * inset {
        break;
      }
      let rect = Rect::at(
        (detection.x_min + inset) as i32,
        (detection.y_min + inset) as i32,
      )
      .of_size(detection.width() - 2 * inset, detection.height() - 2 * inset);
      draw_hollow_rect_mut(image, rect, Rgb(BOX_COLOR));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Detection {
    Detection {
      label: "Pedestrian".to_string(),
      score: 0.9,
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  #[test]
  fn boxes_are_drawn_onto_the_image() {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
    draw_detections(&mut image, &[detection(10, 10, 30, 30)]);
    assert_eq!(*image.get_pixel(10, 10), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(20, 10), Rgb(BOX_COLOR));
    // 框内部不受影响
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_do_not_panic() {
    let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
    draw_detections(&mut image, &[detection(5, 5, 5, 5), detection(0, 0, 1, 1)]);
  }
}
