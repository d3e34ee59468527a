// 该文件是 Soushan （搜山） 项目的一部分。
// src/annotation.rs - 标注输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt::Write as _;
use std::path::Path;

use crate::model::Detection;

/// 一张已处理图像对应的标注，独立于生成它的检测对象
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub folder: String,
  pub filename: String,
  pub width: u32,
  pub height: u32,
  pub objects: Vec<AnnotationObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationObject {
  pub name: String,
  pub x_min: u32,
  pub y_min: u32,
  pub x_max: u32,
  pub y_max: u32,
}

impl Annotation {
  /// 由最终检测构造标注，folder/filename 取自输出图像路径
  pub fn from_detections(
    detections: &[Detection],
    width: u32,
    height: u32,
    image_path: &Path,
  ) -> Self {
    let filename = image_path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let folder = image_path
      .parent()
      .and_then(|parent| parent.file_name())
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    let objects = detections
      .iter()
      .map(|detection| AnnotationObject {
        name: detection.label.clone(),
        x_min: detection.x_min,
        y_min: detection.y_min,
        x_max: detection.x_max,
        y_max: detection.y_max,
      })
      .collect();

    Annotation {
      folder,
      filename,
      width,
      height,
      objects,
    }
  }

  pub fn to_xml(&self) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\"?>\n");
    xml.push_str("<annotation>\n");
    let _ = writeln!(xml, "  <folder>{}</folder>", escape(&self.folder));
    let _ = writeln!(xml, "  <filename>{}</filename>", escape(&self.filename));
    xml.push_str("  <size>\n");
    let _ = writeln!(xml, "    <width>{}</width>", self.width);
    let _ = writeln!(xml, "    <height>{}</height>", self.height);
    xml.push_str("    <depth>3</depth>\n");
    xml.push_str("  </size>\n");
    for object in &self.objects {
      xml.push_str("  <object>\n");
      let _ = writeln!(xml, "    <name>{}</name>", escape(&object.name));
      xml.push_str("    <bndbox>\n");
      let _ = writeln!(xml, "      <xmin>{}</xmin>", object.x_min);
      let _ = writeln!(xml, "      <ymin>{}</ymin>", object.y_min);
      let _ = writeln!(xml, "      <xmax>{}</xmax>", object.x_max);
      let _ = writeln!(xml, "      <ymax>{}</ymax>", object.y_max);
      xml.push_str("    </bndbox>\n");
      xml.push_str("  </object>\n");
    }
    xml.push_str("</annotation>\n");
    xml
  }

  pub fn save_to_xml(&self, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path, self.to_xml())
  }
}

fn escape(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for character in text.chars() {
    match character {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&apos;"),
      other => escaped.push(other),
    }
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection() -> Detection {
    Detection {
      label: "Pedestrian".to_string(),
      score: 0.9,
      x_min: 10,
      y_min: 20,
      x_max: 100,
      y_max: 200,
    }
  }

  #[test]
  fn annotation_takes_names_from_output_path() {
    let annotation = Annotation::from_detections(
      &[detection()],
      640,
      480,
      Path::new("/data/out/frame-1.jpg"),
    );
    assert_eq!(annotation.folder, "out");
    assert_eq!(annotation.filename, "frame-1.jpg");
    assert_eq!(annotation.objects.len(), 1);
  }

  #[test]
  fn xml_contains_size_and_boxes() {
    let annotation = Annotation::from_detections(
      &[detection()],
      640,
      480,
      Path::new("/data/out/frame-1.jpg"),
    );
    let xml = annotation.to_xml();
    assert!(xml.contains("<width>640</width>"));
    assert!(xml.contains("<height>480</height>"));
    assert!(xml.contains("<name>Pedestrian</name>"));
    assert!(xml.contains("<xmin>10</xmin>"));
    assert!(xml.contains("<ymax>200</ymax>"));
  }

  #[test]
  fn xml_special_characters_are_escaped() {
    let mut bad_label = detection();
    bad_label.label = "a<b&c".to_string();
    let annotation =
      Annotation::from_detections(&[bad_label], 10, 10, Path::new("out/x.png"));
    let xml = annotation.to_xml();
    assert!(xml.contains("<name>a&lt;b&amp;c</name>"));
  }
}
