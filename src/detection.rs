// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/detection.rs - 检测结果归一化
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

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{model::RawBox, taxonomy::Taxonomy};

/// 单个已归一化的检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 相对图像宽高的坐标 [x1, y1, x2, y2]，保留 4 位小数
  pub box_normalized: [f32; 4],
  /// 保留 4 位小数的置信度
  pub confidence: f32,
  pub fine_class_index: u32,
  pub coarse_class_index: i32,
  pub fine_name: String,
  pub coarse_name: String,
  /// `大类/小类`
  pub label: String,
}

#[derive(Serialize)]
struct DetectionRepr<'a> {
  label: &'a str,
  big_name: &'a str,
  small_name: &'a str,
  confidence: f32,
  x1: f32,
  y1: f32,
  x2: f32,
  y2: f32,
}

impl Serialize for Detection {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let [x1, y1, x2, y2] = self.box_normalized;
    DetectionRepr {
      label: &self.label,
      big_name: &self.coarse_name,
      small_name: &self.fine_name,
      confidence: self.confidence,
      x1,
      y1,
      x2,
      y2,
    }
    .serialize(serializer)
  }
}

/// 保留 4 位小数，恰好居中时取偶数
pub fn round4(value: f32) -> f32 {
  round4_f64(value as f64)
}

fn round4_f64(value: f64) -> f32 {
  ((value * 10_000.0).round_ties_even() / 10_000.0) as f32
}

/// 像素坐标转为相对坐标，尺寸为 0 时返回 0.0
pub fn normalize_coord(pixel: f32, dimension: u32) -> f32 {
  if dimension == 0 {
    return 0.0;
  }
  round4_f64(pixel as f64 / dimension as f64)
}

pub fn normalize_box(raw: &RawBox, taxonomy: &Taxonomy, width: u32, height: u32) -> Detection {
  let fine_name = taxonomy.fine_name(raw.class_id).into_owned();
  let coarse_class_index = taxonomy.coarse_index(raw.class_id);
  let coarse_name = taxonomy.coarse_name(coarse_class_index).into_owned();
  let [x1, y1, x2, y2] = raw.bbox;

  Detection {
    box_normalized: [
      normalize_coord(x1, width),
      normalize_coord(y1, height),
      normalize_coord(x2, width),
      normalize_coord(y2, height),
    ],
    confidence: round4(raw.score),
    fine_class_index: raw.class_id,
    coarse_class_index,
    label: format!("{}/{}", coarse_name, fine_name),
    fine_name,
    coarse_name,
  }
}

/// 按原始顺序把推理输出转换为检测记录
pub fn normalize_boxes(raw: &[RawBox], taxonomy: &Taxonomy, width: u32, height: u32) -> Vec<Detection> {
  let detections: Vec<Detection> = raw
    .iter()
    .map(|item| normalize_box(item, taxonomy, width, height))
    .collect();
  debug!("归一化 {} 个检测目标 ({}x{})", detections.len(), width, height);
  detections
}

/// 置信度最高的目标，置信度相同时取最先出现的
pub fn top_detection(detections: &[Detection]) -> Option<&Detection> {
  // 只有严格更高才替换，相同置信度时保留较早的目标
  detections.iter().reduce(|best, current| {
    if current.confidence > best.confidence {
      current
    } else {
      best
    }
  })
}
