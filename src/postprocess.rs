// 该文件是 Soushan （搜山） 项目的一部分。
// src/postprocess.rs - 检测后处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::engine::{EngineError, EngineOutputs};
use crate::model::Detection;
use crate::preprocess::LetterboxTransform;

/// 原始候选框的编码方式，由插件声明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
  /// [x_min, y_min, x_max, y_max]
  Corners,
  /// [center_x, center_y, width, height]
  CenterSize,
}

/// 原始候选框坐标的量纲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordUnits {
  /// 画布像素
  CanvasPixels,
  /// 归一化到 [0, 1]，乘以画布边长得到像素
  Normalized,
}

/// 引擎输出张量的组织方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLayout {
  /// 按名称取框与得分张量，候选数取自得分张量长度
  Named {
    boxes: &'static str,
    scores: &'static str,
  },
  /// 按位置取框、得分与有效数张量，候选数取自有效数张量
  IndexedWithCount {
    boxes: usize,
    scores: usize,
    count: usize,
  },
}

/// 某个插件的后处理参数
#[derive(Debug, Clone)]
pub struct PostprocessSpec {
  pub layout: RawLayout,
  pub encoding: BoxEncoding,
  pub units: CoordUnits,
  pub label: &'static str,
}

/// 模型空间中的一个候选检测，编码方式由插件声明
#[derive(Debug, Clone)]
pub struct RawDetection {
  pub label: String,
  pub score: f32,
  pub raw_box: [f32; 4],
}

/// 从引擎输出张量提取候选检测。形状不符视为引擎层故障。
pub fn decode_outputs(
  outputs: &EngineOutputs,
  spec: &PostprocessSpec,
) -> Result<Vec<RawDetection>, EngineError> {
  let (boxes, scores, count) = match spec.layout {
    RawLayout::Named { boxes, scores } => {
      let boxes_tensor = outputs
        .by_name(boxes)
        .ok_or_else(|| EngineError::MissingOutput(boxes.to_string()))?;
      let scores_tensor = outputs
        .by_name(scores)
        .ok_or_else(|| EngineError::MissingOutput(scores.to_string()))?;
      let (_, boxes) = boxes_tensor
        .as_f32()
        .ok_or_else(|| EngineError::ShapeMismatch(boxes.to_string()))?;
      let (_, scores) = scores_tensor
        .as_f32()
        .ok_or_else(|| EngineError::ShapeMismatch(scores.to_string()))?;
      (boxes, scores, scores.len())
    }
    RawLayout::IndexedWithCount {
      boxes,
      scores,
      count,
    } => {
      let boxes_tensor = outputs
        .by_index(boxes)
        .ok_or_else(|| EngineError::MissingOutput(format!("#{}", boxes)))?;
      let scores_tensor = outputs
        .by_index(scores)
        .ok_or_else(|| EngineError::MissingOutput(format!("#{}", scores)))?;
      let count_tensor = outputs
        .by_index(count)
        .ok_or_else(|| EngineError::MissingOutput(format!("#{}", count)))?;
      let (_, boxes) = boxes_tensor
        .as_f32()
        .ok_or_else(|| EngineError::ShapeMismatch(format!("#{}", boxes)))?;
      let (_, scores) = scores_tensor
        .as_f32()
        .ok_or_else(|| EngineError::ShapeMismatch(format!("#{}", scores)))?;
      let valid = count_tensor
        .first_as_i64()
        .ok_or_else(|| EngineError::ShapeMismatch(format!("#{}", count)))?;
      (boxes, scores, valid.max(0) as usize)
    }
  };

  let count = count.min(scores.len()).min(boxes.len() / 4);
  let mut candidates = Vec::with_capacity(count);
  for i in 0..count {
    candidates.push(RawDetection {
      label: spec.label.to_string(),
      score: scores[i],
      raw_box: [
        boxes[i * 4],
        boxes[i * 4 + 1],
        boxes[i * 4 + 2],
        boxes[i * 4 + 3],
      ],
    });
  }

  Ok(candidates)
}

/// 把候选检测解码为角点形式、过滤低分、映射回原图并做聚类合并。
/// 候选按输入顺序处理，合并只与已接受的区域比较，结果依赖输入
/// 顺序，这是继承的契约，不是标准的非极大值抑制。
pub fn resolve(
  candidates: Vec<RawDetection>,
  spec: &PostprocessSpec,
  transform: &LetterboxTransform,
  canvas: u32,
  source_width: u32,
  source_height: u32,
  threshold: f32,
) -> Vec<Detection> {
  let mut regions: Vec<Detection> = Vec::new();

  for candidate in candidates {
    let [a, b, c, d] = candidate.raw_box;
    let (x0, y0, x1, y1) = match spec.encoding {
      BoxEncoding::Corners => (a, b, c, d),
      BoxEncoding::CenterSize => (a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0),
    };
    let (x0, y0, x1, y1) = match spec.units {
      CoordUnits::CanvasPixels => (x0, y0, x1, y1),
      CoordUnits::Normalized => {
        let side = canvas as f32;
        (x0 * side, y0 * side, x1 * side, y1 * side)
      }
    };

    // 严格低于阈值的候选被丢弃，等于阈值的保留
    if candidate.score < threshold {
      continue;
    }

    // 映射回原图并截断到图像范围内
    let width = source_width as f32;
    let height = source_height as f32;
    let detection = Detection {
      label: candidate.label,
      score: candidate.score,
      x_min: transform.back_project_x(x0).clamp(0.0, width) as u32,
      y_min: transform.back_project_y(y0).clamp(0.0, height) as u32,
      x_max: transform.back_project_x(x1).clamp(0.0, width) as u32,
      y_max: transform.back_project_y(y1).clamp(0.0, height) as u32,
    };

    merge_into(&mut regions, detection);
  }

  debug!("合并后剩余 {} 个检测", regions.len());
  regions
}

fn spans_overlap(a_min: u32, a_max: u32, b_min: u32, b_max: u32) -> bool {
  a_min <= b_max && b_min <= a_max
}

/// 把一个候选并入已接受的区域集合。同标签且满足任一覆盖条件的
/// 区域按触发的轴取并集、得分取较大者；条件逐个求值并立即改写
/// 区域，与一个候选并入多个区域都是保留下来的历史行为。
fn merge_into(regions: &mut Vec<Detection>, candidate: Detection) {
  let mut merged = false;

  for region in regions.iter_mut() {
    if region.label != candidate.label {
      continue;
    }

    let mut merged_here = false;

    if region.x_min <= candidate.x_min
      && candidate.x_min <= region.x_max
      && spans_overlap(region.y_min, region.y_max, candidate.y_min, candidate.y_max)
    {
      region.x_max = region.x_max.max(candidate.x_max);
      merged_here = true;
    }
    if region.x_min <= candidate.x_max
      && candidate.x_max <= region.x_max
      && spans_overlap(region.y_min, region.y_max, candidate.y_min, candidate.y_max)
    {
      region.x_min = region.x_min.min(candidate.x_min);
      merged_here = true;
    }

    if region.y_min <= candidate.y_min
      && candidate.y_min <= region.y_max
      && spans_overlap(region.x_min, region.x_max, candidate.x_min, candidate.x_max)
    {
      region.y_max = region.y_max.max(candidate.y_max);
      merged_here = true;
    }
    if region.y_min <= candidate.y_max
      && candidate.y_max <= region.y_max
      && spans_overlap(region.x_min, region.x_max, candidate.x_min, candidate.x_max)
    {
      region.y_min = region.y_min.min(candidate.y_min);
      merged_here = true;
    }

    if candidate.x_min <= region.x_min && candidate.x_max >= region.x_max {
      region.x_min = region.x_min.min(candidate.x_min);
      region.x_max = region.x_max.max(candidate.x_max);
      merged_here = true;
    }
    if candidate.y_min <= region.y_min && candidate.y_max >= region.y_max {
      region.y_min = region.y_min.min(candidate.y_min);
      region.y_max = region.y_max.max(candidate.y_max);
      merged_here = true;
    }

    if merged_here {
      region.score = region.score.max(candidate.score);
      merged = true;
    }
  }

  if !merged {
    regions.push(candidate);
  }
}
