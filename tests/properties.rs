// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// tests/properties.rs - 归一化与历史记录的性质测试
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

use std::{collections::BTreeMap, sync::Arc, thread};

use fenlei::{
  detection::{Detection, normalize_box, normalize_coord, round4},
  history::{HistoryKind, HistoryLog, MAX_HISTORY_LENGTH, VISIBLE_HISTORY_LENGTH},
  model::RawBox,
  taxonomy::Taxonomy,
};
use proptest::prelude::*;

fn detection(label: String, confidence: f32) -> Detection {
  Detection {
    box_normalized: [0.0; 4],
    confidence,
    fine_class_index: 0,
    coarse_class_index: 0,
    fine_name: String::new(),
    coarse_name: String::new(),
    label,
  }
}

fn taxonomy() -> Taxonomy {
  Taxonomy::new(
    BTreeMap::from([(0, "bottle".to_string())]),
    BTreeMap::from([(0, 2)]),
    BTreeMap::from([(2, "recyclable".to_string())]),
  )
}

proptest! {
  #[test]
  fn coordinate_inside_image_stays_in_unit_range(
    dimension in 1u32..=4000,
    fraction in 0.0f64..=1.0,
  ) {
    let pixel = (dimension as f64 * fraction) as f32;
    let normalized = normalize_coord(pixel, dimension);
    prop_assert!((0.0..=1.0).contains(&normalized));
    prop_assert!((normalized as f64 - pixel as f64 / dimension as f64).abs() <= 0.00005 + 1e-7);
  }

  #[test]
  fn confidence_is_rounded_to_four_places(score in 0.0f32..=1.0) {
    let raw = RawBox::new([0.0, 0.0, 10.0, 10.0], score, 0);
    let detection = normalize_box(&raw, &taxonomy(), 100, 100);
    prop_assert_eq!(detection.confidence, round4(score));
    prop_assert!((detection.confidence - score).abs() <= 0.00005 + f32::EPSILON);
    prop_assert_eq!(detection.label, "recyclable/bottle");
  }

  #[test]
  fn history_is_bounded_and_recent_is_tail(count in 0usize..60) {
    let log = HistoryLog::new();
    for i in 0..count {
      log.record(&[detection(format!("a/{}", i), 0.5)], HistoryKind::Image);
    }
    let entries = log.entries();
    prop_assert_eq!(entries.len(), count.min(MAX_HISTORY_LENGTH));

    let recent = log.recent();
    let visible = entries.len().min(VISIBLE_HISTORY_LENGTH);
    prop_assert_eq!(recent.as_slice(), &entries[entries.len() - visible..]);

    if count > 0 {
      let last = format!("[image] a/{}(confidence=0.50)", count - 1);
      prop_assert_eq!(entries.last(), Some(&last));
    }
  }
}

#[test]
fn coordinates_match_four_place_rounding() {
  // (pixel, dimension, 期望值)，包含二进制下恰好居中的情况
  let cases = [
    (10.0, 200, 0.05),
    (1.0, 3, 0.3333),
    (2.0, 3, 0.6667),
    (1.0, 32, 0.0312),
    (3.0, 32, 0.0938),
    (5.0, 160, 0.0312),
    (7.0, 64, 0.1094),
    (640.0, 640, 1.0),
  ];
  for (pixel, dimension, expected) in cases {
    assert_eq!(normalize_coord(pixel, dimension), expected, "{}/{}", pixel, dimension);
  }
}

#[test]
fn concurrent_records_are_not_lost() {
  let log = Arc::new(HistoryLog::new());
  let handles: Vec<_> = (0..4)
    .map(|t| {
      let log = log.clone();
      thread::spawn(move || {
        for i in 0..5 {
          log.record(&[detection(format!("t{}/{}", t, i), 0.6)], HistoryKind::RealtimeFrame);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  let entries = log.entries();
  assert_eq!(entries.len(), MAX_HISTORY_LENGTH);
  for t in 0..4 {
    for i in 0..5 {
      let entry = format!("[realtime-frame] t{}/{}(confidence=0.60)", t, i);
      assert!(entries.contains(&entry), "missing {}", entry);
    }
  }
}
