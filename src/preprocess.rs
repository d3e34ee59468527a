// 该文件是 Soushan （搜山） 项目的一部分。
// src/preprocess.rs - 图像预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;

/// 缩放后图像在画布上的放置方式。两种都是合法的 letterbox，
/// 但必须与后处理中的逆变换配对使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
  /// 居中，四周对称填充
  Centered,
  /// 靠左上角，只在右侧和下侧填充
  TopLeft,
}

/// 像素值归一化方式，常量是插件与其网络权重的契约，必须逐位复现
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalize {
  /// [0, 255] 线性缩放到 [0, 1]，通道序保持 RGB
  Scale255,
  /// 通道序反转为 BGR 并按通道减去均值
  MeanSubBgr([f32; 3]),
}

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  Nhwc,
  Nchw,
}

/// 某个插件的预处理参数
#[derive(Debug, Clone)]
pub struct PreprocessSpec {
  /// 方形画布边长
  pub canvas: u32,
  /// 填充色
  pub fill: [u8; 3],
  pub placement: Placement,
  pub normalize: Normalize,
  pub layout: TensorLayout,
}

/// 预处理施加的几何变换，后处理用它把模型坐标映射回原图:
/// source = (model - offset) / scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub scale: f32,
  pub left: u32,
  pub top: u32,
}

impl LetterboxTransform {
  pub fn identity() -> Self {
    LetterboxTransform {
      scale: 1.0,
      left: 0,
      top: 0,
    }
  }

  /// 画布 X 坐标映射回原图
  pub fn back_project_x(&self, x: f32) -> f32 {
    (x - self.left as f32) / self.scale
  }

  /// 画布 Y 坐标映射回原图
  pub fn back_project_y(&self, y: f32) -> f32 {
    (y - self.top as f32) / self.scale
  }

  /// 原图 X 坐标映射到画布
  pub fn project_x(&self, x: f32) -> f32 {
    x * self.scale + self.left as f32
  }

  /// 原图 Y 坐标映射到画布
  pub fn project_y(&self, y: f32) -> f32 {
    y * self.scale + self.top as f32
  }
}

/// 保持纵横比地把原图缩放并填充到方形画布上，再按插件要求的
/// 布局和归一化方式转成张量。返回张量和施加的几何变换。
pub fn letterbox(image: &RgbImage, spec: &PreprocessSpec) -> (Array4<f32>, LetterboxTransform) {
  let (width, height) = image.dimensions();
  let side = spec.canvas;

  let ratio = (side as f32 / width as f32).min(side as f32 / height as f32);
  let scaled_width = (width as f32 * ratio).round() as u32;
  let scaled_height = (height as f32 * ratio).round() as u32;

  let (left, top) = match spec.placement {
    Placement::Centered => (
      side / 2 - scaled_width / 2,
      side / 2 - scaled_height / 2,
    ),
    Placement::TopLeft => (0, 0),
  };

  let mut canvas = RgbImage::from_pixel(side, side, Rgb(spec.fill));
  if (scaled_width, scaled_height) == (width, height) {
    imageops::overlay(&mut canvas, image, left as i64, top as i64);
  } else {
    let resized = imageops::resize(image, scaled_width, scaled_height, FilterType::Triangle);
    imageops::overlay(&mut canvas, &resized, left as i64, top as i64);
  }

  let tensor = to_tensor(&canvas, spec);
  let transform = LetterboxTransform {
    scale: ratio,
    left,
    top,
  };

  (tensor, transform)
}

fn to_tensor(canvas: &RgbImage, spec: &PreprocessSpec) -> Array4<f32> {
  let side = spec.canvas as usize;
  match spec.layout {
    TensorLayout::Nhwc => {
      let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
      for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
          tensor[[0, y as usize, x as usize, channel]] = normalize(pixel, channel, &spec.normalize);
        }
      }
      tensor
    }
    TensorLayout::Nchw => {
      let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
      for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
          tensor[[0, channel, y as usize, x as usize]] = normalize(pixel, channel, &spec.normalize);
        }
      }
      tensor
    }
  }
}

fn normalize(pixel: &Rgb<u8>, channel: usize, normalize: &Normalize) -> f32 {
  match normalize {
    Normalize::Scale255 => pixel[channel] as f32 / 255.0,
    // 通道 0..2 依次是 B G R
    Normalize::MeanSubBgr(means) => pixel[2 - channel] as f32 - means[channel],
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec(canvas: u32) -> PreprocessSpec {
    PreprocessSpec {
      canvas,
      fill: [128, 128, 128],
      placement: Placement::Centered,
      normalize: Normalize::Scale255,
      layout: TensorLayout::Nhwc,
    }
  }

  #[test]
  fn square_image_matching_canvas_is_identity() {
    let image = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
    let (_, transform) = letterbox(&image, &spec(32));
    assert_eq!(transform, LetterboxTransform::identity());
  }

  #[test]
  fn scaled_dimensions_stay_within_canvas() {
    let cases = [(640, 480), (480, 640), (1, 1), (101, 100), (3000, 17)];
    for (width, height) in cases {
      let image = RgbImage::new(width, height);
      let (_, transform) = letterbox(&image, &spec(100));
      assert!(transform.scale > 0.0);
      let scaled_width = (width as f32 * transform.scale).round() as u32;
      let scaled_height = (height as f32 * transform.scale).round() as u32;
      assert!(scaled_width.max(scaled_height) <= 100, "{}x{}", width, height);
    }
  }

  #[test]
  fn landscape_image_is_centered_vertically() {
    let image = RgbImage::new(640, 480);
    let (_, transform) = letterbox(&image, &spec(320));
    // 640x480 -> 320x240, 上下各留 40
    assert_eq!(transform.scale, 0.5);
    assert_eq!(transform.left, 0);
    assert_eq!(transform.top, 40);
  }

  #[test]
  fn top_left_placement_has_zero_offsets() {
    let image = RgbImage::new(640, 480);
    let mut spec = spec(320);
    spec.placement = Placement::TopLeft;
    let (_, transform) = letterbox(&image, &spec);
    assert_eq!(transform.left, 0);
    assert_eq!(transform.top, 0);
  }

  #[test]
  fn back_projection_inverts_forward_projection() {
    let image = RgbImage::new(640, 480);
    let (_, transform) = letterbox(&image, &spec(320));
    for point in [0.0_f32, 13.7, 100.0, 639.0] {
      let round_trip_x = transform.back_project_x(transform.project_x(point));
      let round_trip_y = transform.back_project_y(transform.project_y(point));
      assert!((round_trip_x - point).abs() < 1e-3);
      assert!((round_trip_y - point).abs() < 1e-3);
    }
  }

  #[test]
  fn padding_is_filled_with_constant_color() {
    let image = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
    let (tensor, transform) = letterbox(&image, &spec(320));
    // 顶部填充区
    assert_eq!(tensor[[0, 0, 160, 0]], 128.0 / 255.0);
    // 内容区
    let inside = transform.top as usize + 10;
    assert_eq!(tensor[[0, inside, 160, 0]], 1.0);
  }

  #[test]
  fn mean_sub_reverses_channel_order() {
    let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
    let spec = PreprocessSpec {
      canvas: 8,
      fill: [128, 128, 128],
      placement: Placement::Centered,
      normalize: Normalize::MeanSubBgr([103.939, 116.779, 123.68]),
      layout: TensorLayout::Nhwc,
    };
    let (tensor, _) = letterbox(&image, &spec);
    assert!((tensor[[0, 4, 4, 0]] - (30.0 - 103.939)).abs() < 1e-4);
    assert!((tensor[[0, 4, 4, 1]] - (20.0 - 116.779)).abs() < 1e-4);
    assert!((tensor[[0, 4, 4, 2]] - (10.0 - 123.68)).abs() < 1e-4);
  }

  #[test]
  fn nchw_layout_places_channels_first() {
    let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
    let spec = PreprocessSpec {
      layout: TensorLayout::Nchw,
      ..spec(8)
    };
    let (tensor, _) = letterbox(&image, &spec);
    assert_eq!(tensor.shape(), [1, 3, 8, 8]);
    assert_eq!(tensor[[0, 0, 4, 4]], 1.0);
    assert_eq!(tensor[[0, 1, 4, 4]], 0.0);
  }
}
