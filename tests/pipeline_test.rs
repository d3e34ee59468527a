use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgb, RgbImage};

use soushan::model::{ModelError, ObjectDetectionModel, infer_detached};
use soushan::output::write_outputs;
use soushan::registry::PluginRegistry;

fn write_registry(dir: &Path) -> PathBuf {
  let config_path = dir.join("plugins.json");
  std::fs::write(
    &config_path,
    r#"{"plugins": [{"tag": "soushan.fake"}]}"#,
  )
  .unwrap();
  config_path
}

fn write_image(dir: &Path, name: &str) -> PathBuf {
  let image_path = dir.join(name);
  let image = RgbImage::from_pixel(64, 48, Rgb([20, 120, 220]));
  image.save(&image_path).unwrap();
  image_path
}

#[test]
fn fake_plugin_runs_end_to_end() {
  let workspace = tempfile::tempdir().unwrap();
  let output_dir = workspace.path().join("out");
  std::fs::create_dir(&output_dir).unwrap();

  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-1.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  assert_eq!(registry.len(), 1);
  let plugin = registry.get(0).unwrap();
  assert_eq!(plugin.descriptor().tag, "soushan.fake");

  let model = plugin.load_model(0.5).unwrap();
  let (width, height) = image::image_dimensions(&image_path).unwrap();
  assert_eq!((width, height), (64, 48));

  // 假插件的两个固定目标都不低于阈值
  let detections = model.infer(&image_path, width, height).unwrap();
  assert_eq!(detections.len(), 2);
  assert!(detections.iter().all(|d| d.score >= 0.5));

  let outputs = write_outputs(&image_path, &output_dir, &detections, width, height, false).unwrap();
  assert!(outputs.image_path.is_file());
  assert!(outputs.annotation_path.is_file());

  let xml = std::fs::read_to_string(&outputs.annotation_path).unwrap();
  assert!(xml.contains("<filename>frame-1.png</filename>"));
  assert!(xml.contains("<width>64</width>"));
  assert!(xml.contains("<name>FakeObject</name>"));
  assert!(xml.contains("<xmin>10</xmin>"));
}

#[test]
fn second_infer_call_is_independent() {
  let workspace = tempfile::tempdir().unwrap();
  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-2.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  let model = registry.get(0).unwrap().load_model(0.5).unwrap();

  let first = model.infer(&image_path, 64, 48).unwrap();
  let second = model.infer(&image_path, 64, 48).unwrap();
  assert_eq!(first, second);
}

#[test]
fn higher_threshold_yields_fewer_detections() {
  let workspace = tempfile::tempdir().unwrap();
  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-3.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  let plugin = registry.get(0).unwrap();

  let relaxed = plugin.load_model(0.4).unwrap();
  let strict = plugin.load_model(0.9).unwrap();
  let relaxed_count = relaxed.infer(&image_path, 64, 48).unwrap().len();
  let strict_count = strict.infer(&image_path, 64, 48).unwrap().len();
  assert_eq!(relaxed_count, 2);
  assert_eq!(strict_count, 1);
}

#[test]
fn detached_inference_matches_synchronous_result() {
  let workspace = tempfile::tempdir().unwrap();
  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-4.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  let model: Arc<dyn ObjectDetectionModel> =
    Arc::from(registry.get(0).unwrap().load_model(0.5).unwrap());

  let synchronous = model.infer(&image_path, 64, 48).unwrap();
  let handle = infer_detached(model.clone(), image_path.clone(), 64, 48);
  let detached = handle.join().unwrap().unwrap();
  assert_eq!(synchronous, detached);
}

#[test]
fn closed_model_refuses_to_infer() {
  let workspace = tempfile::tempdir().unwrap();
  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-5.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  let model = registry.get(0).unwrap().load_model(0.5).unwrap();
  model.close();

  assert!(matches!(
    model.infer(&image_path, 64, 48),
    Err(ModelError::Disposed)
  ));
}

#[test]
fn drawn_output_still_writes_annotation() {
  let workspace = tempfile::tempdir().unwrap();
  let output_dir = workspace.path().join("out");
  std::fs::create_dir(&output_dir).unwrap();

  let config = write_registry(workspace.path());
  let image_path = write_image(workspace.path(), "frame-6.png");

  let registry = PluginRegistry::discover(&config).unwrap();
  let model = registry.get(0).unwrap().load_model(0.5).unwrap();
  let detections = model.infer(&image_path, 64, 48).unwrap();

  let outputs = write_outputs(&image_path, &output_dir, &detections, 64, 48, true).unwrap();
  assert!(outputs.image_path.is_file());
  assert!(outputs.annotation_path.is_file());

  // 画框后的拷贝仍然可以解码，尺寸不变
  let (width, height) = image::image_dimensions(&outputs.image_path).unwrap();
  assert_eq!((width, height), (64, 48));
}
