// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/dataset.rs - 数据集整理：VOC 转换、标签归一化与训练/验证集划分
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

use std::{
  collections::{BTreeMap, BTreeSet},
  path::{Path, PathBuf},
};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;
use tracing::{info, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];
const SPLITS: [&str; 2] = ["train", "val"];

pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无效标签行: {0}")]
  InvalidLine(String),
  #[error("划分比例无效: {0}")]
  InvalidRatio(f64),
  #[error("XML 解析错误: {0}")]
  XmlError(#[from] roxmltree::Error),
  #[error("VOC 标注无效: {0}")]
  InvalidAnnotation(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
  pub files: usize,
  pub skipped_files: usize,
  pub skipped_lines: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvertStats {
  pub files: usize,
  pub skipped_files: usize,
  pub skipped_objects: usize,
  pub classes: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
  pub train: usize,
  pub val: usize,
  pub unlabeled: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VocObject {
  pub class: String,
  pub bbox: [f64; 4], // [xmin, ymin, xmax, ymax]
}

/// 单个 VOC 标注文件
#[derive(Debug, Clone, PartialEq)]
pub struct VocAnnotation {
  pub filename: String,
  pub width: f64,
  pub height: f64,
  pub objects: Vec<VocObject>,
}

fn child<'a, 'input>(node: roxmltree::Node<'a, 'input>, name: &str) -> Option<roxmltree::Node<'a, 'input>> {
  node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str, DatasetError> {
  child(node, name)
    .and_then(|n| n.text())
    .map(str::trim)
    .ok_or_else(|| DatasetError::InvalidAnnotation(format!("缺少 <{}>", name)))
}

fn child_f64(node: roxmltree::Node<'_, '_>, name: &str) -> Result<f64, DatasetError> {
  let text = child_text(node, name)?;
  text
    .parse()
    .map_err(|_| DatasetError::InvalidAnnotation(format!("<{}> 不是数值: {}", name, text)))
}

/// 解析 VOC XML，坐标和尺寸均按浮点数读取
pub fn parse_voc_xml(content: &str) -> Result<VocAnnotation, DatasetError> {
  let doc = roxmltree::Document::parse(content)?;
  let root = doc.root_element();

  let size = child(root, "size").ok_or_else(|| DatasetError::InvalidAnnotation("缺少 <size>".to_string()))?;
  let width = child_f64(size, "width")?;
  let height = child_f64(size, "height")?;
  if width <= 0.0 || height <= 0.0 {
    return Err(DatasetError::InvalidAnnotation(format!("图像尺寸无效: {}x{}", width, height)));
  }
  let filename = child_text(root, "filename").unwrap_or_default().to_string();

  let mut objects = Vec::new();
  for obj in root.descendants().filter(|n| n.has_tag_name("object")) {
    let class = child_text(obj, "name")?.to_string();
    let bndbox = child(obj, "bndbox").ok_or_else(|| DatasetError::InvalidAnnotation("缺少 <bndbox>".to_string()))?;
    objects.push(VocObject {
      class,
      bbox: [
        child_f64(bndbox, "xmin")?,
        child_f64(bndbox, "ymin")?,
        child_f64(bndbox, "xmax")?,
        child_f64(bndbox, "ymax")?,
      ],
    });
  }

  Ok(VocAnnotation {
    filename,
    width,
    height,
    objects,
  })
}

/// 角点框转为 YOLO 的中心点与宽高比例
pub fn voc_to_yolo(bbox: [f64; 4], width: f64, height: f64) -> [f64; 4] {
  let [xmin, ymin, xmax, ymax] = bbox;
  [
    (xmin + xmax) / 2.0 / width,
    (ymin + ymax) / 2.0 / height,
    (xmax - xmin) / width,
    (ymax - ymin) / height,
  ]
}

/// 批量把 VOC XML 转为 YOLO 标签
///
/// 未给出类别表时按字母序收集全部类别，并写入 `<output>/classes.txt`。
/// 不在类别表中的目标会被跳过，无法解析的文件同样跳过。
pub fn convert_voc_dir(
  xml_dir: &Path,
  output_dir: &Path,
  class_names: Option<&[String]>,
) -> Result<ConvertStats, DatasetError> {
  std::fs::create_dir_all(output_dir)?;

  let mut xml_files: Vec<PathBuf> = std::fs::read_dir(xml_dir)?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "xml"))
    .collect();
  xml_files.sort();

  let mut stats = ConvertStats::default();
  let mut annotations = Vec::with_capacity(xml_files.len());
  for path in xml_files {
    let parsed = std::fs::read_to_string(&path)
      .map_err(DatasetError::from)
      .and_then(|content| parse_voc_xml(&content));
    match parsed {
      Ok(annotation) => annotations.push((path, annotation)),
      Err(e) => {
        warn!("跳过 {}: {}", path.display(), e);
        stats.skipped_files += 1;
      }
    }
  }

  let classes: Vec<String> = match class_names {
    Some(names) => names.to_vec(),
    None => {
      let collected: BTreeSet<&str> = annotations
        .iter()
        .flat_map(|(_, a)| a.objects.iter().map(|o| o.class.as_str()))
        .collect();
      let classes: Vec<String> = collected.into_iter().map(str::to_string).collect();
      info!("检测到 {} 个类别: {:?}", classes.len(), classes);
      std::fs::write(output_dir.join("classes.txt"), classes.join("\n"))?;
      classes
    }
  };
  let class_map: BTreeMap<&str, usize> = classes
    .iter()
    .enumerate()
    .map(|(idx, name)| (name.as_str(), idx))
    .collect();
  stats.classes = classes.len();

  for (path, annotation) in &annotations {
    let mut output = String::new();
    for obj in &annotation.objects {
      let Some(class_id) = class_map.get(obj.class.as_str()) else {
        warn!("类别 {} 不在映射中，跳过该标注", obj.class);
        stats.skipped_objects += 1;
        continue;
      };
      let [cx, cy, w, h] = voc_to_yolo(obj.bbox, annotation.width, annotation.height);
      output.push_str(&format!("{} {:.4} {:.4} {:.4} {:.4}\n", class_id, cx, cy, w, h));
    }

    let Some(stem) = path.file_stem() else {
      continue;
    };
    std::fs::write(output_dir.join(stem).with_extension("txt"), output)?;
    stats.files += 1;
  }

  info!("转换完成: {} 个文件, 输出路径 {}", stats.files, output_dir.display());
  Ok(stats)
}

/// 把像素坐标的 YOLO 标签行转为相对坐标，结果夹在 [0, 1] 并保留 6 位小数
///
/// 空行返回 `None`。
pub fn normalize_label_line(line: &str, width: u32, height: u32) -> Result<Option<String>, DatasetError> {
  let line = line.trim();
  if line.is_empty() {
    return Ok(None);
  }

  let parts: Vec<&str> = line.split_whitespace().collect();
  if parts.len() < 5 {
    return Err(DatasetError::InvalidLine(line.to_string()));
  }

  let mut values = [0f64; 4];
  for (value, part) in values.iter_mut().zip(&parts[1..5]) {
    *value = part
      .parse()
      .map_err(|_| DatasetError::InvalidLine(line.to_string()))?;
  }

  let dims = [width, height, width, height];
  let normalized: Vec<String> = values
    .iter()
    .zip(dims)
    .map(|(v, d)| {
      let n = if d == 0 { 0.0 } else { v / d as f64 };
      format!("{:.6}", n.clamp(0.0, 1.0))
    })
    .collect();

  Ok(Some(format!("{} {}", parts[0], normalized.join(" "))))
}

fn has_image_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

// 先找 `<stem>_original.<ext>`，再找 `<stem>.<ext>`
fn find_image_for_label(images_dir: &Path, stem: &str) -> Option<PathBuf> {
  let candidates = [format!("{}_original", stem), stem.to_string()];
  candidates.iter().find_map(|name| {
    IMAGE_EXTENSIONS
      .iter()
      .map(|ext| images_dir.join(format!("{}.{}", name, ext)))
      .find(|path| path.is_file())
  })
}

/// 原地修正 `labels/{train,val}` 下的标签文件
pub fn normalize_label_dir<P: AsRef<Path>>(root: P) -> Result<NormalizeStats, DatasetError> {
  let root = root.as_ref();
  let mut stats = NormalizeStats::default();

  for split in SPLITS {
    let labels_dir = root.join("labels").join(split);
    let images_dir = root.join("images").join(split);
    if !labels_dir.is_dir() {
      warn!("标签目录不存在 {}", labels_dir.display());
      continue;
    }
    if !images_dir.is_dir() {
      warn!("图片目录不存在 {}", images_dir.display());
      continue;
    }

    let mut label_files: Vec<PathBuf> = std::fs::read_dir(&labels_dir)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.extension().is_some_and(|e| e == "txt"))
      .collect();
    label_files.sort();

    for label_path in label_files {
      let stem = label_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      let Some(image_path) = find_image_for_label(&images_dir, &stem) else {
        warn!("跳过：未找到 {} 对应的图片", label_path.display());
        stats.skipped_files += 1;
        continue;
      };
      let (width, height) = match image::image_dimensions(&image_path) {
        Ok(dims) => dims,
        Err(e) => {
          warn!("无法打开图片 {}: {}", image_path.display(), e);
          stats.skipped_files += 1;
          continue;
        }
      };

      let content = std::fs::read_to_string(&label_path)?;
      let mut lines = Vec::new();
      for line in content.lines() {
        match normalize_label_line(line, width, height) {
          Ok(Some(normalized)) => lines.push(normalized),
          Ok(None) => {}
          Err(e) => {
            warn!("{}: {}", label_path.display(), e);
            stats.skipped_lines += 1;
          }
        }
      }

      let mut output = lines.join("\n");
      if !output.is_empty() {
        output.push('\n');
      }
      std::fs::write(&label_path, output)?;
      stats.files += 1;
      info!("已修正: {} (图片 {})", label_path.display(), image_path.display());
    }
  }

  Ok(stats)
}

/// 按固定随机种子把带标签的图片划分为训练集和验证集
pub fn split_dataset(
  images_dir: &Path,
  labels_dir: &Path,
  output_dir: &Path,
  ratio: f64,
  seed: u64,
) -> Result<SplitStats, DatasetError> {
  if !(0.0..=1.0).contains(&ratio) {
    return Err(DatasetError::InvalidRatio(ratio));
  }

  for kind in ["images", "labels"] {
    for split in SPLITS {
      std::fs::create_dir_all(output_dir.join(kind).join(split))?;
    }
  }

  let mut images: Vec<PathBuf> = std::fs::read_dir(images_dir)?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| path.is_file() && has_image_extension(path))
    .collect();
  images.sort();

  let mut stats = SplitStats::default();
  let mut pairs = Vec::with_capacity(images.len());
  for image_path in images {
    let Some(stem) = image_path.file_stem() else {
      continue;
    };
    let label_path = labels_dir.join(stem).with_extension("txt");
    if label_path.is_file() {
      pairs.push((image_path, label_path));
    } else {
      warn!("{} 没有对应的标注文件，已跳过", image_path.display());
      stats.unlabeled += 1;
    }
  }

  let mut rng = StdRng::seed_from_u64(seed);
  pairs.shuffle(&mut rng);
  let split_idx = (pairs.len() as f64 * ratio) as usize;

  for (idx, (image_path, label_path)) in pairs.iter().enumerate() {
    let split = if idx < split_idx { "train" } else { "val" };
    for (kind, src) in [("images", image_path), ("labels", label_path)] {
      if let Some(name) = src.file_name() {
        std::fs::copy(src, output_dir.join(kind).join(split).join(name))?;
      }
    }
  }

  stats.train = split_idx;
  stats.val = pairs.len() - split_idx;
  info!(
    "划分完成: 训练集 {}, 验证集 {}, 无标注 {}",
    stats.train, stats.val, stats.unlabeled
  );
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;

  fn voc_xml(filename: &str, objects: &[(&str, [u32; 4])]) -> String {
    let objects: String = objects
      .iter()
      .map(|(name, [x1, y1, x2, y2])| {
        format!(
          "<object><name>{name}</name><bndbox><xmin>{x1}</xmin><ymin>{y1}</ymin><xmax>{x2}</xmax><ymax>{y2}</ymax></bndbox></object>"
        )
      })
      .collect();
    format!(
      "<annotation><filename>{filename}</filename><size><width>200</width><height>100</height><depth>3</depth></size>{objects}</annotation>"
    )
  }

  #[test]
  fn parses_voc_annotation() {
    let annotation = parse_voc_xml(&voc_xml("a.jpg", &[("cup", [10, 20, 110, 80])])).unwrap();
    assert_eq!(annotation.filename, "a.jpg");
    assert_eq!((annotation.width, annotation.height), (200.0, 100.0));
    assert_eq!(annotation.objects[0].class, "cup");
    assert_eq!(
      voc_to_yolo(annotation.objects[0].bbox, annotation.width, annotation.height),
      [0.3, 0.5, 0.5, 0.6]
    );
    assert!(parse_voc_xml("<annotation><size><width>0</width><height>1</height></size></annotation>").is_err());
    assert!(parse_voc_xml("<annotation>").is_err());
  }

  #[test]
  fn converts_voc_dir_with_sorted_classes() {
    let xml_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    std::fs::write(
      xml_dir.path().join("0001.xml"),
      voc_xml("0001.jpg", &[("paper", [0, 0, 100, 50]), ("bottle", [50, 25, 150, 75])]),
    )
    .unwrap();
    std::fs::write(xml_dir.path().join("0002.xml"), voc_xml("0002.jpg", &[("bottle", [10, 10, 30, 30])])).unwrap();
    std::fs::write(xml_dir.path().join("broken.xml"), "<annotation>").unwrap();
    std::fs::write(xml_dir.path().join("notes.txt"), "ignored").unwrap();

    let stats = convert_voc_dir(xml_dir.path(), out.path(), None).unwrap();
    assert_eq!(stats, ConvertStats { files: 2, skipped_files: 1, skipped_objects: 0, classes: 2 });
    assert_eq!(std::fs::read_to_string(out.path().join("classes.txt")).unwrap(), "bottle\npaper");
    assert_eq!(
      std::fs::read_to_string(out.path().join("0001.txt")).unwrap(),
      "1 0.2500 0.2500 0.5000 0.5000\n0 0.5000 0.5000 0.5000 0.5000\n"
    );
    assert_eq!(
      std::fs::read_to_string(out.path().join("0002.txt")).unwrap(),
      "0 0.1000 0.2000 0.1000 0.2000\n"
    );
  }

  #[test]
  fn given_classes_skip_unknown_objects() {
    let xml_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    std::fs::write(
      xml_dir.path().join("x.xml"),
      voc_xml("x.jpg", &[("paper", [0, 0, 100, 50]), ("glass", [0, 0, 10, 10])]),
    )
    .unwrap();

    let classes = vec!["bottle".to_string(), "paper".to_string()];
    let stats = convert_voc_dir(xml_dir.path(), out.path(), Some(&classes)).unwrap();
    assert_eq!(stats.skipped_objects, 1);
    assert!(!out.path().join("classes.txt").exists());
    assert_eq!(
      std::fs::read_to_string(out.path().join("x.txt")).unwrap(),
      "1 0.2500 0.2500 0.5000 0.5000\n"
    );
  }

  #[test]
  fn normalizes_and_clamps_lines() {
    let line = normalize_label_line("3 320 240 64 960", 640, 480).unwrap().unwrap();
    assert_eq!(line, "3 0.500000 0.500000 0.100000 1.000000");
    assert!(normalize_label_line("   ", 640, 480).unwrap().is_none());
    assert!(normalize_label_line("3 1 2 3", 640, 480).is_err());
    assert!(normalize_label_line("3 a 2 3 4", 640, 480).is_err());
  }

  #[test]
  fn rewrites_label_dir_in_place() {
    let root = tempfile::tempdir().unwrap();
    let labels = root.path().join("labels/train");
    let images = root.path().join("images/train");
    std::fs::create_dir_all(&labels).unwrap();
    std::fs::create_dir_all(&images).unwrap();

    RgbImage::new(100, 50).save(images.join("cup_original.png")).unwrap();
    std::fs::write(labels.join("cup.txt"), "1 50 25 10 5\nbad\n").unwrap();
    std::fs::write(labels.join("orphan.txt"), "0 1 1 1 1\n").unwrap();

    let stats = normalize_label_dir(root.path()).unwrap();
    assert_eq!(stats, NormalizeStats { files: 1, skipped_files: 1, skipped_lines: 1 });
    assert_eq!(
      std::fs::read_to_string(labels.join("cup.txt")).unwrap(),
      "1 0.500000 0.500000 0.100000 0.100000\n"
    );
  }

  #[test]
  fn split_is_deterministic() {
    let src = tempfile::tempdir().unwrap();
    let images = src.path().join("JPEGImages");
    let labels = src.path().join("labels");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::create_dir_all(&labels).unwrap();
    for i in 0..10 {
      std::fs::write(images.join(format!("{i}.jpg")), b"jpg").unwrap();
      std::fs::write(labels.join(format!("{i}.txt")), b"0 0.5 0.5 0.1 0.1").unwrap();
    }
    std::fs::write(images.join("extra.png"), b"png").unwrap();

    let run = |out: &Path| {
      let stats = split_dataset(&images, &labels, out, DEFAULT_SPLIT_RATIO, DEFAULT_SPLIT_SEED).unwrap();
      let mut train: Vec<String> = std::fs::read_dir(out.join("images/train"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
      train.sort();
      (stats, train)
    };

    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let (stats_a, train_a) = run(a.path());
    let (stats_b, train_b) = run(b.path());

    assert_eq!(stats_a, SplitStats { train: 8, val: 2, unlabeled: 1 });
    assert_eq!(stats_a, stats_b);
    assert_eq!(train_a, train_b);
    assert_eq!(std::fs::read_dir(a.path().join("labels/val")).unwrap().count(), 2);
  }

  #[test]
  fn rejects_bad_ratio() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      split_dataset(dir.path(), dir.path(), dir.path(), 1.5, 0),
      Err(DatasetError::InvalidRatio(_))
    ));
  }
}
