// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/output/font.rs - 标签字体查找
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

use ab_glyph::FontArc;
use tracing::{info, warn};

/// 字体候选列表的环境变量，格式与 `PATH` 相同
pub const FONT_ENV: &str = "FENLEI_FONTS";

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// 按顺序尝试的字体文件列表，全部不可用时退回内置字体
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontCandidates {
  paths: Vec<PathBuf>,
}

impl FontCandidates {
  pub fn new<I, P>(paths: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    Self {
      paths: paths.into_iter().map(Into::into).collect(),
    }
  }

  pub fn from_env() -> Self {
    match std::env::var_os(FONT_ENV) {
      Some(value) => Self::new(std::env::split_paths(&value)),
      None => Self::default(),
    }
  }

  /// 在已有候选之后追加
  pub fn chain(mut self, other: FontCandidates) -> Self {
    self.paths.extend(other.paths);
    self
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }

  /// 返回第一个可用的字体，不会失败
  pub fn load(&self) -> FontArc {
    for path in &self.paths {
      if let Some(font) = try_load(path) {
        info!("使用字体: {}", path.display());
        return font;
      }
    }
    if !self.paths.is_empty() {
      warn!("未找到可用字体，使用内置字体");
    }
    embedded_font()
  }
}

fn try_load(path: &Path) -> Option<FontArc> {
  if !path.is_file() {
    return None;
  }
  let data = match std::fs::read(path) {
    Ok(data) => data,
    Err(e) => {
      warn!("读取字体失败 {}: {}", path.display(), e);
      return None;
    }
  };
  match FontArc::try_from_vec(data) {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("解析字体失败 {}: {}", path.display(), e);
      None
    }
  }
}

pub fn embedded_font() -> FontArc {
  FontArc::try_from_slice(EMBEDDED_FONT).expect("无法加载嵌入的字体文件")
}

#[cfg(test)]
mod tests {
  use ab_glyph::Font;

  use super::*;

  #[test]
  fn missing_and_corrupt_fonts_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let corrupt = dir.path().join("broken.ttf");
    std::fs::write(&corrupt, b"not a font").unwrap();

    let candidates = FontCandidates::new([dir.path().join("missing.ttf"), corrupt]);
    let font = candidates.load();
    assert!(font.glyph_id('A').0 != 0);
  }

  #[test]
  fn first_valid_candidate_wins() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.ttf");
    std::fs::write(&good, EMBEDDED_FONT).unwrap();

    let candidates = FontCandidates::new([dir.path().join("missing.ttf")])
      .chain(FontCandidates::new([good.clone()]));
    assert_eq!(candidates.paths().len(), 2);
    assert!(try_load(&good).is_some());
    assert!(candidates.load().glyph_id('g').0 != 0);
  }
}
