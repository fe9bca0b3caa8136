// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/history.rs - 检测历史记录
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
  collections::VecDeque,
  fmt,
  sync::{Mutex, MutexGuard},
};

use tracing::debug;

use crate::detection::{Detection, top_detection};

/// 内部保留的历史条数
pub const MAX_HISTORY_LENGTH: usize = 20;
/// 对外展示的历史条数
pub const VISIBLE_HISTORY_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
  Image,
  RealtimeFrame,
  Video,
}

impl fmt::Display for HistoryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      HistoryKind::Image => "image",
      HistoryKind::RealtimeFrame => "realtime-frame",
      HistoryKind::Video => "video",
    };
    f.write_str(name)
  }
}

/// 有界的检测历史，超过上限时按先进先出淘汰
///
/// 追加操作由互斥锁串行化，多个调用方可以共享同一份记录。
#[derive(Debug, Default)]
pub struct HistoryLog {
  entries: Mutex<VecDeque<String>>,
}

impl HistoryLog {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(VecDeque::with_capacity(MAX_HISTORY_LENGTH + 1)),
    }
  }

  fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
    // 记录只包含字符串，持锁线程 panic 后数据依然完整
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// 记录一次检测中置信度最高的目标，无目标时不记录
  pub fn record(&self, detections: &[Detection], kind: HistoryKind) -> bool {
    let Some(top) = top_detection(detections) else {
      return false;
    };

    let entry = format!("[{}] {}(confidence={:.2})", kind, top.label, top.confidence);
    let mut entries = self.lock();
    entries.push_back(entry);
    if entries.len() > MAX_HISTORY_LENGTH {
      entries.pop_front();
    }
    debug!("历史记录 {} 条", entries.len());
    true
  }

  /// 全部历史，由旧到新
  pub fn entries(&self) -> Vec<String> {
    self.lock().iter().cloned().collect()
  }

  /// 最近的至多 10 条历史，由旧到新
  pub fn recent(&self) -> Vec<String> {
    let entries = self.lock();
    let skip = entries.len().saturating_sub(VISIBLE_HISTORY_LENGTH);
    entries.iter().skip(skip).cloned().collect()
  }

  pub fn recent_text(&self) -> String {
    self.recent().join("\n")
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }
}
