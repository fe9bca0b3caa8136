// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{thread, time::Duration};

use image::RgbImage;
use tracing::{info, warn};

use crate::{
  classifier::{Classifier, NO_OBJECTS_DETECTED, Report},
  history::HistoryKind,
  model::{DetectResult, Model},
  output::Render,
  video::{VideoReport, VideoSummary, sample_interval},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, classifier: &Classifier<M>, output: O)
  -> Result<Self::Output, Self::Error>;
}

/// 单张图像检测
pub struct OneShotTask;

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  O: Render<RgbImage, Report, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Output = Report;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, classifier: &Classifier<M>, output: O) -> Result<Report, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let report = classifier.classify(&frame, HistoryKind::Image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &report)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(report)
  }
}

/// 连续的实时帧检测，收到中断信号或检测被停止时退出
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理器，每个进程只能安装一次
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  O: Render<RgbImage, Report, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Output = usize;
  type Error = anyhow::Error;

  fn run_task(self, input: I, classifier: &Classifier<M>, output: O) -> Result<usize, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    classifier.start();
    let mut frame_index = 0;
    let mut now = std::time::Instant::now();
    for frame in input {
      if !classifier.is_running() {
        warn!("检测已停止，退出任务循环");
        break;
      }
      frame_index += 1;
      info!("处理第 {} 帧图像", frame_index);
      match classifier.classify(&frame, HistoryKind::RealtimeFrame) {
        Ok(report) => {
          let elapsed_a = now.elapsed();
          output.render_result(&frame, &report)?;
          info!(
            "推理完成，耗时: {:.2?} / {:.2?}",
            elapsed_a,
            now.elapsed()
          );
        }
        Err(e) => warn!("第 {} 帧检测失败: {}", frame_index, e),
      }
      now = std::time::Instant::now();
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        classifier.stop();
      }
    }
    classifier.stop();

    info!("任务完成，退出");
    Ok(frame_index)
  }
}

/// 按帧率抽帧的视频检测，结束时记录一条汇总历史
#[derive(Debug)]
pub struct VideoTask {
  fps: f64,
  total_frames: Option<u64>,
}

impl VideoTask {
  pub fn new(fps: f64) -> Self {
    Self {
      fps,
      total_frames: None,
    }
  }

  /// 总帧数用于估计视频时长，未知时按短视频处理
  pub fn with_total_frames(mut self, total_frames: Option<u64>) -> Self {
    self.total_frames = total_frames;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  O: Render<RgbImage, Report, Error = RE>,
> Task<I, M, O> for VideoTask
{
  type Output = VideoReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, classifier: &Classifier<M>, output: O) -> Result<VideoReport, Self::Error> {
    let interval = sample_interval(self.fps, self.total_frames.unwrap_or(0));
    info!("视频帧率 {:.1}, 采样间隔: {} 帧", self.fps, interval);

    let mut summary = VideoSummary::new();
    let mut total_frames = 0usize;
    let mut sampled_frames = 0usize;
    let mut failed_frames = 0usize;

    for frame in input {
      total_frames += 1;
      if total_frames % interval != 0 {
        continue;
      }
      sampled_frames += 1;

      match classifier.detect(&frame) {
        Ok((raw, annotated, detections)) => {
          summary.merge(&detections);
          let report = Report::new(annotated, raw, detections, classifier.history().recent_text());
          output.render_result(&frame, &report)?;
        }
        Err(e) => {
          warn!("处理第 {} 帧失败: {}", total_frames, e);
          failed_frames += 1;
        }
      }
    }

    let detections = summary.into_detections();
    classifier.history().record(&detections, HistoryKind::Video);
    info!(
      "视频处理完成: {} 帧, 采样 {} 帧, 失败 {} 帧, {} 类目标",
      total_frames,
      sampled_frames,
      failed_frames,
      detections.len()
    );

    let introduction = if detections.is_empty() {
      NO_OBJECTS_DETECTED.to_string()
    } else {
      String::new()
    };

    Ok(VideoReport {
      total_frames,
      sampled_frames,
      failed_frames,
      detected_labels: detections.iter().map(|d| d.label.clone()).collect(),
      detections,
      introduction,
      history: classifier.history().recent_text(),
    })
  }
}
