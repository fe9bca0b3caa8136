// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::{detection::Detection, model::RawBox, output::font::FontCandidates};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_OFFSET: i32 = 22; // 标签位于边框上方
const LABEL_TEXT_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 3;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [0, 0, 0];

pub struct Draw {
  font: FontArc,
  font_size: f32,
  box_thickness: i32,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self::from_candidates(&FontCandidates::from_env())
  }
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      box_thickness: BOX_THICKNESS,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    }
  }

  pub fn from_candidates(candidates: &FontCandidates) -> Self {
    Self::new(candidates.load())
  }

  // 在像素坐标处绘制边框，线宽向内扩展
  fn draw_bbox(&self, image: &mut RgbImage, bbox: [i32; 4]) {
    let [x_min, y_min, x_max, y_max] = bbox;
    for t in 0..self.box_thickness {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  fn draw_label(&self, image: &mut RgbImage, x_min: i32, y_min: i32, text: &str) {
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, &self.font, text);

    let label_x = x_min.clamp(0, image.width().saturating_sub(1) as i32);
    let label_y = y_min.saturating_sub(LABEL_OFFSET).max(0);
    let strip_width = text_width + 2 * LABEL_TEXT_PADDING as u32;
    let strip_height = text_height + 2 * LABEL_TEXT_PADDING as u32;

    let rect = Rect::at(label_x, label_y).of_size(strip_width.max(1), strip_height.max(1));
    draw_filled_rect_mut(image, rect, Rgb(self.box_color));
    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x + LABEL_TEXT_PADDING,
      label_y + LABEL_TEXT_PADDING,
      scale,
      &self.font,
      text,
    );
  }

  /// 在图像上绘制检测框和 `标签 置信度` 文本
  ///
  /// `raw` 与 `detections` 一一对应，边框使用原始像素坐标。
  pub fn draw_detections(&self, image: &mut RgbImage, raw: &[RawBox], detections: &[Detection]) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let max_x = image.width().min(i32::MAX as u32) as i32 - 1;
    let max_y = image.height().min(i32::MAX as u32) as i32 - 1;
    for (item, detection) in raw.iter().zip(detections) {
      // 裁剪到图像范围内
      let [x1, y1, x2, y2] = item.bbox;
      let bbox = [
        (x1 as i32).clamp(0, max_x),
        (y1 as i32).clamp(0, max_y),
        (x2 as i32).clamp(0, max_x),
        (y2 as i32).clamp(0, max_y),
      ];
      if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        continue;
      }
      self.draw_bbox(image, bbox);
      let text = format!("{} {:.2}", detection.label, item.score);
      self.draw_label(image, bbox[0], bbox[1], &text);
    }
  }
}
