// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/classifier.rs - 分类检测上下文
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  detection::{Detection, normalize_boxes},
  history::{HistoryKind, HistoryLog},
  model::{DetectResult, Model},
  output::{draw::Draw, font::FontCandidates},
  taxonomy::Taxonomy,
};

/// 未检测到目标时的提示
pub const NO_OBJECTS_DETECTED: &str = "no objects detected";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("推理失败: {0}")]
  InferenceFailed(#[source] BoxError),
}

/// 一次检测的完整结果
#[derive(Debug, Clone, Serialize)]
pub struct Report {
  #[serde(skip)]
  pub annotated: RgbImage,
  #[serde(skip)]
  pub raw: DetectResult,
  pub detections: Vec<Detection>,
  pub detected_label: String,
  pub introduction: String,
  pub history: String,
}

impl Report {
  pub fn new(annotated: RgbImage, raw: DetectResult, detections: Vec<Detection>, history: String) -> Self {
    let detected_label = detections
      .first()
      .map(|d| d.label.clone())
      .unwrap_or_default();
    let introduction = if detections.is_empty() {
      NO_OBJECTS_DETECTED.to_string()
    } else {
      String::new()
    };

    Self {
      annotated,
      raw,
      detections,
      detected_label,
      introduction,
      history,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

pub struct ClassifierBuilder {
  taxonomy: Taxonomy,
  fonts: FontCandidates,
  history: Option<Arc<HistoryLog>>,
}

impl ClassifierBuilder {
  pub fn new(taxonomy: Taxonomy) -> Self {
    Self {
      taxonomy,
      fonts: FontCandidates::default(),
      history: None,
    }
  }

  pub fn fonts(mut self, fonts: FontCandidates) -> Self {
    self.fonts = fonts;
    self
  }

  /// 与其他调用方共享同一份历史记录
  pub fn history(mut self, history: Arc<HistoryLog>) -> Self {
    self.history = Some(history);
    self
  }

  pub fn build<M>(self, model: M) -> Classifier<M> {
    info!(
      "创建分类器: {} 个小类别, {} 个大类别",
      self.taxonomy.num_fine_classes(),
      self.taxonomy.num_coarse_classes()
    );
    Classifier {
      taxonomy: self.taxonomy,
      model,
      draw: Draw::from_candidates(&self.fonts),
      history: self.history.unwrap_or_default(),
      running: AtomicBool::new(false),
    }
  }
}

/// 持有分类表、推理后端和历史记录的上下文
pub struct Classifier<M> {
  taxonomy: Taxonomy,
  model: M,
  draw: Draw,
  history: Arc<HistoryLog>,
  running: AtomicBool,
}

impl<M> Classifier<M> {
  pub fn taxonomy(&self) -> &Taxonomy {
    &self.taxonomy
  }

  pub fn history(&self) -> &Arc<HistoryLog> {
    &self.history
  }

  pub fn start(&self) {
    info!("检测启动");
    self.running.store(true, Ordering::SeqCst);
  }

  pub fn stop(&self) {
    info!("检测停止");
    self.running.store(false, Ordering::SeqCst);
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  /// 归一化推理输出并绘制标注，无目标时返回原图副本
  pub fn normalize(&self, image: &RgbImage, raw: &DetectResult) -> (RgbImage, Vec<Detection>) {
    let detections = normalize_boxes(&raw.items, &self.taxonomy, image.width(), image.height());
    let mut overlay = image.clone();
    if !detections.is_empty() {
      self.draw.draw_detections(&mut overlay, &raw.items, &detections);
    }
    (overlay, detections)
  }

  /// 停止检测并释放推理后端
  pub fn shutdown(self) -> M {
    self.stop();
    info!("分类器已关闭, 历史记录 {} 条", self.history.len());
    self.model
  }
}

impl<M, E> Classifier<M>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  /// 推理并归一化，不记录历史
  pub fn detect(
    &self,
    image: &RgbImage,
  ) -> Result<(DetectResult, RgbImage, Vec<Detection>), ClassifyError> {
    let raw = self.model.infer(image).map_err(|e| {
      error!("模型推理失败: {}", e);
      ClassifyError::InferenceFailed(Box::new(e))
    })?;
    let (overlay, detections) = self.normalize(image, &raw);
    debug!("检测到 {} 个目标", detections.len());
    Ok((raw, overlay, detections))
  }

  pub fn classify(&self, image: &RgbImage, kind: HistoryKind) -> Result<Report, ClassifyError> {
    let (raw, annotated, detections) = self.detect(image)?;
    self.history.record(&detections, kind);
    Ok(Report::new(annotated, raw, detections, self.history.recent_text()))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use image::Rgb;

  use super::*;
  use crate::model::RawBox;

  #[derive(Debug, Error)]
  #[error("backend offline")]
  struct Offline;

  struct Fixed(Vec<RawBox>);

  impl Model for Fixed {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = Offline;

    fn infer(&self, _input: &RgbImage) -> Result<DetectResult, Offline> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  struct Failing;

  impl Model for Failing {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = Offline;

    fn infer(&self, _input: &RgbImage) -> Result<DetectResult, Offline> {
      Err(Offline)
    }
  }

  fn taxonomy() -> Taxonomy {
    Taxonomy::new(
      BTreeMap::from([(0, "banana peel".to_string()), (1, "bottle".to_string())]),
      BTreeMap::from([(0, 1), (1, 2)]),
      BTreeMap::from([(1, "kitchen waste".to_string()), (2, "recyclable".to_string())]),
    )
  }

  #[test]
  fn classify_builds_report_and_history() {
    let classifier = ClassifierBuilder::new(taxonomy()).build(Fixed(vec![
      RawBox::new([10.0, 10.0, 100.0, 100.0], 0.6, 1),
      RawBox::new([20.0, 20.0, 80.0, 80.0], 0.91, 0),
    ]));
    let image = RgbImage::new(200, 200);
    let report = classifier.classify(&image, HistoryKind::Image).unwrap();

    assert_eq!(report.detections.len(), 2);
    assert_eq!(report.detected_label, "recyclable/bottle");
    assert_eq!(report.introduction, "");
    assert_eq!(report.history, "[image] kitchen waste/banana peel(confidence=0.91)");
    assert_ne!(report.annotated, image);
  }

  #[test]
  fn empty_result_keeps_image_and_history() {
    let classifier = ClassifierBuilder::new(taxonomy()).build(Fixed(Vec::new()));
    let image = RgbImage::from_pixel(40, 40, Rgb([1, 2, 3]));
    let report = classifier.classify(&image, HistoryKind::RealtimeFrame).unwrap();

    assert!(report.is_empty());
    assert_eq!(report.annotated, image);
    assert_eq!(report.introduction, NO_OBJECTS_DETECTED);
    assert!(classifier.history().is_empty());
  }

  #[test]
  fn inference_failure_is_opaque_and_records_nothing() {
    let classifier = ClassifierBuilder::new(taxonomy()).build(Failing);
    let err = classifier
      .classify(&RgbImage::new(32, 32), HistoryKind::Image)
      .unwrap_err();
    assert!(matches!(err, ClassifyError::InferenceFailed(_)));
    assert!(classifier.history().is_empty());
  }

  #[test]
  fn normalize_survives_extreme_coordinates() {
    let classifier = ClassifierBuilder::new(taxonomy()).build(Fixed(Vec::new()));
    let raw = DetectResult::from(vec![RawBox::new([-3e9, -3e9, 3e9, 3e9], 0.9, 0)]);
    let (overlay, detections) = classifier.normalize(&RgbImage::new(64, 64), &raw);

    assert_eq!(detections.len(), 1);
    assert!(detections[0].box_normalized[0] < -1e6);
    assert_eq!(*overlay.get_pixel(63, 40), Rgb([0, 255, 0]));
  }

  #[test]
  fn shared_history_and_switch() {
    let history = Arc::new(HistoryLog::new());
    let a = ClassifierBuilder::new(taxonomy())
      .history(history.clone())
      .build(Fixed(vec![RawBox::new([0.0, 0.0, 5.0, 5.0], 0.7, 0)]));
    let b = ClassifierBuilder::new(taxonomy())
      .history(history.clone())
      .build(Fixed(vec![RawBox::new([0.0, 0.0, 5.0, 5.0], 0.7, 1)]));

    a.classify(&RgbImage::new(10, 10), HistoryKind::Image).unwrap();
    b.classify(&RgbImage::new(10, 10), HistoryKind::Video).unwrap();
    assert_eq!(history.len(), 2);

    assert!(!a.is_running());
    a.start();
    assert!(a.is_running());
    let model = a.shutdown();
    assert_eq!(model.0.len(), 1);
  }
}
