// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/model/record.rs - 回放检测记录的推理后端
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicUsize, Ordering},
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DEFAULT_CONFIDENCE, DetectResult, Model, RawBox},
};

#[derive(Error, Debug)]
pub enum RecordReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录格式错误 ({path}:{line}): {message}")]
  InvalidRecord {
    path: PathBuf,
    line: usize,
    message: String,
  },
  #[error("置信度阈值无效: {0}")]
  InvalidConfidence(String),
}

#[derive(Debug, Clone)]
enum RecordSource {
  File(PathBuf),
  Directory(PathBuf),
}

/// 回放检测记录的后端
///
/// 记录每行为 `class_id, score, x1, y1, x2, y2`，坐标为像素坐标。
/// 指向目录时第 N 次推理读取 `<dir>/<N>.txt`（从 1 开始），缺失视为无目标；
/// 指向文件时每次推理都回放同一份记录。
#[derive(Debug)]
pub struct RecordReplay {
  source: RecordSource,
  confidence: f32,
  frame_counter: AtomicUsize,
}

impl FromUrlWithScheme for RecordReplay {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordReplay {
  type Error = RecordReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordReplayError::SchemeMismatch(format!(
        "期望后端 '{}', 实际后端 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut confidence = DEFAULT_CONFIDENCE;
    for (k, v) in url.query_pairs() {
      if k == "conf" {
        confidence = v
          .parse::<f32>()
          .ok()
          .filter(|c| (0.0..=1.0).contains(c))
          .ok_or_else(|| RecordReplayError::InvalidConfidence(v.to_string()))?;
      }
    }

    Self::open(url.path(), confidence)
  }
}

impl RecordReplay {
  pub fn open<P: AsRef<Path>>(path: P, confidence: f32) -> Result<Self, RecordReplayError> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;
    let source = if metadata.is_dir() {
      RecordSource::Directory(path.to_path_buf())
    } else {
      RecordSource::File(path.to_path_buf())
    };
    info!("打开检测记录: {}, 置信度阈值: {}", path.display(), confidence);

    Ok(Self {
      source,
      confidence,
      frame_counter: AtomicUsize::new(0),
    })
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  fn read_records(&self, path: &Path) -> Result<Vec<RawBox>, RecordReplayError> {
    let content = std::fs::read_to_string(path)?;
    let mut items = Vec::new();
    for (idx, line) in content.lines().enumerate() {
      let parsed = parse_record_line(line).map_err(|message| RecordReplayError::InvalidRecord {
        path: path.to_path_buf(),
        line: idx + 1,
        message,
      })?;
      if let Some(item) = parsed
        && item.score >= self.confidence
      {
        items.push(item);
      }
    }
    Ok(items)
  }
}

impl Model for RecordReplay {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = RecordReplayError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let frame_id = self.frame_counter.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(
      "回放第 {} 帧检测记录, 图像尺寸 {}x{}",
      frame_id,
      input.width(),
      input.height()
    );

    let items = match &self.source {
      RecordSource::File(path) => self.read_records(path)?,
      RecordSource::Directory(dir) => {
        let path = dir.join(format!("{}.txt", frame_id));
        if path.is_file() {
          self.read_records(&path)?
        } else {
          debug!("记录不存在, 视为无目标: {}", path.display());
          Vec::new()
        }
      }
    };

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

/// 解析一行检测记录，空行返回 `None`
pub fn parse_record_line(line: &str) -> Result<Option<RawBox>, String> {
  let line = line.trim();
  if line.is_empty() {
    return Ok(None);
  }

  let fields: Vec<&str> = line.split(',').map(str::trim).collect();
  if fields.len() != 6 {
    return Err(format!("期望 6 个字段, 实际 {} 个", fields.len()));
  }

  let class_id = fields[0]
    .parse::<u32>()
    .map_err(|e| format!("类别索引无效 '{}': {}", fields[0], e))?;
  let mut values = [0f32; 5];
  for (value, field) in values.iter_mut().zip(&fields[1..]) {
    *value = field
      .parse::<f32>()
      .map_err(|e| format!("数值无效 '{}': {}", field, e))?;
  }

  Ok(Some(RawBox::new(
    [values[1], values[2], values[3], values[4]],
    values[0],
    class_id,
  )))
}

pub fn format_record_line(item: &RawBox) -> String {
  format!(
    "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
    item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
  )
}
