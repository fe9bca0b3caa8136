// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Datelike, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  classifier::Report,
  model::{DetectResult, format_record_line},
  output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存每一帧
///
/// 默认保存标注图；`?record` 时保存原图并在旁边写入原始检测记录，
/// 记录格式可以直接被 `record://` 后端回放。`?always` 时无目标的帧也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      always,
      frame_counter: Mutex::new(0),
    })
  }
}

fn write_records(result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
  let lines: Vec<String> = result.items.iter().map(format_record_line).collect();
  std::fs::write(path.with_extension("txt"), lines.join("\n"))
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let mut counter = self.frame_counter.lock().unwrap_or_else(|e| e.into_inner());
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, Report> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &Report) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    if self.record {
      frame.save(&path)?;
      write_records(&result.raw, &path)?;
    } else {
      result.annotated.save(&path)?;
    }
    debug!("保存帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{RawBox, RecordReplay, Model};

  fn collect_files(dir: &Path, ext: &str, found: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        collect_files(&path, ext, found);
      } else if path.extension().is_some_and(|e| e == ext) {
        found.push(path);
      }
    }
  }

  fn report(raw: Vec<RawBox>) -> Report {
    Report {
      annotated: RgbImage::new(30, 30),
      raw: DetectResult::from(raw),
      detections: Vec::new(),
      detected_label: String::new(),
      introduction: String::new(),
      history: String::new(),
    }
  }

  #[test]
  fn record_mode_writes_replayable_records() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record&always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = RgbImage::new(30, 30);
    output
      .render_result(&frame, &report(vec![RawBox::new([1.0, 2.0, 10.0, 12.0], 0.8, 4)]))
      .unwrap();

    let mut records = Vec::new();
    collect_files(dir.path(), "txt", &mut records);
    assert_eq!(records.len(), 1);

    let replay = RecordReplay::open(&records[0], 0.5).unwrap();
    let result = replay.infer(&frame).unwrap();
    assert_eq!(result.items[0], RawBox::new([1.0, 2.0, 10.0, 12.0], 0.8, 4));
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&RgbImage::new(30, 30), &report(Vec::new())).unwrap();

    let mut images = Vec::new();
    collect_files(dir.path(), "png", &mut images);
    assert!(images.is_empty());
  }
}
