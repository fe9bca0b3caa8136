// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/video.rs - 视频抽帧与结果汇总
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

use std::collections::{HashMap, hash_map::Entry};

use serde::Serialize;

use crate::detection::Detection;

/// 根据帧率和总帧数计算抽帧间隔
///
/// 短于 60 秒的视频每秒约取 10 帧，短于 300 秒取 5 帧，更长的取 2 帧。
pub fn sample_interval(fps: f64, total_frames: u64) -> usize {
  let duration = if fps > 0.0 {
    total_frames as f64 / fps
  } else {
    0.0
  };
  let rate = if duration < 60.0 {
    10.0
  } else if duration < 300.0 {
    5.0
  } else {
    2.0
  };
  let interval = (fps / rate).floor();
  if interval.is_finite() && interval >= 1.0 {
    interval as usize
  } else {
    1
  }
}

/// 按标签保留置信度最高的检测结果
#[derive(Debug, Default)]
pub struct VideoSummary {
  best: HashMap<String, (usize, Detection)>,
  order: usize,
}

impl VideoSummary {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn merge(&mut self, detections: &[Detection]) {
    for detection in detections {
      let order = self.order;
      self.order += 1;
      match self.best.entry(detection.label.clone()) {
        Entry::Occupied(mut entry) => {
          if detection.confidence > entry.get().1.confidence {
            entry.get_mut().1 = detection.clone();
          }
        }
        Entry::Vacant(entry) => {
          entry.insert((order, detection.clone()));
        }
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    self.best.is_empty()
  }

  pub fn len(&self) -> usize {
    self.best.len()
  }

  /// 按置信度降序，相同置信度按标签首次出现的先后
  pub fn into_detections(self) -> Vec<Detection> {
    let mut entries: Vec<(usize, Detection)> = self.best.into_values().collect();
    entries.sort_by_key(|(order, _)| *order);
    entries.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
    entries.into_iter().map(|(_, d)| d).collect()
  }
}

/// 视频任务的汇总结果
#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
  pub total_frames: usize,
  pub sampled_frames: usize,
  pub failed_frames: usize,
  pub detections: Vec<Detection>,
  pub detected_labels: Vec<String>,
  pub introduction: String,
  pub history: String,
}
