// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/model.rs - 推理后端
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

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理后端输出的单个目标，坐标为像素坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

impl RawBox {
  pub fn new(bbox: [f32; 4], score: f32, class_id: u32) -> Self {
    Self {
      class_id,
      score,
      bbox,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[RawBox]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<RawBox>> for DetectResult {
  fn from(items: Vec<RawBox>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod record;
pub use self::record::{RecordReplay, RecordReplayError, format_record_line, parse_record_line};
