// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 允许的最小边长
pub const MIN_IMAGE_SIDE: u32 = 20;
/// 允许的最大边长
pub const MAX_IMAGE_SIDE: u32 = 4000;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Image too small: {0}x{1} (min 20x20)")]
  TooSmall(u32, u32),
  #[error("Image too large: {0}x{1} (max 4000x4000)")]
  TooLarge(u32, u32),
}

/// 检查图像尺寸是否在可处理范围内
pub fn check_dimensions(width: u32, height: u32) -> Result<(), ImageFileInputError> {
  if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
    return Err(ImageFileInputError::TooSmall(width, height));
  }
  if width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
    return Err(ImageFileInputError::TooLarge(width, height));
  }
  Ok(())
}

pub fn read_image(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8();
  check_dimensions(image.width(), image.height())?;
  Ok(image)
}

/// 单张图像输入，`image:///path/to/file.jpg`
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let image = read_image(Path::new(url.path()))?;
    info!("读取图像: {} ({}x{})", url.path(), image.width(), image.height());

    Ok(ImageFileInput { image: Some(image) })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

/// 目录中的图像序列，按文件名排序逐帧读取，`folder:///path/to/frames`
///
/// 无法解码或尺寸越界的帧会被跳过。
pub struct ImageSequenceInput {
  frames: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }
    Self::open(url.path())
  }
}

impl ImageSequenceInput {
  pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, ImageFileInputError> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(directory.as_ref())? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
      if path.is_file() && is_image {
        frames.push(path);
      }
    }
    frames.sort();
    info!(
      "图像序列: {} ({} 帧)",
      directory.as_ref().display(),
      frames.len()
    );

    Ok(Self {
      frames: frames.into_iter(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.frames.len()
  }
}

impl Iterator for ImageSequenceInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.frames.by_ref() {
      match read_image(&path) {
        Ok(image) => return Some(image),
        Err(e) => warn!("跳过帧 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dimension_bounds() {
    assert!(check_dimensions(20, 20).is_ok());
    assert!(check_dimensions(4000, 4000).is_ok());
    assert!(matches!(check_dimensions(19, 100), Err(ImageFileInputError::TooSmall(19, 100))));
    assert!(matches!(check_dimensions(100, 4001), Err(ImageFileInputError::TooLarge(100, 4001))));
  }

  #[test]
  fn sequence_is_sorted_and_skips_bad_frames() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(32, 32, image::Rgb([2, 2, 2])).save(dir.path().join("b.png")).unwrap();
    RgbImage::from_pixel(32, 32, image::Rgb([1, 1, 1])).save(dir.path().join("a.png")).unwrap();
    RgbImage::new(8, 8).save(dir.path().join("c.png")).unwrap();
    std::fs::write(dir.path().join("d.jpg"), b"garbage").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let input = ImageSequenceInput::from_url(&url).unwrap();
    assert_eq!(input.remaining(), 4);

    let frames: Vec<RgbImage> = input.collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].get_pixel(0, 0).0, [1, 1, 1]);
    assert_eq!(frames[1].get_pixel(0, 0).0, [2, 2, 2]);
  }

  #[test]
  fn single_image_yields_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    RgbImage::new(64, 48).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.next().map(|i| i.dimensions()), Some((64, 48)));
    assert!(input.next().is_none());
  }
}
