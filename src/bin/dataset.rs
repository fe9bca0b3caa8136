// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/bin/dataset.rs - 数据集整理工具
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

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fenlei::dataset::{
  DEFAULT_SPLIT_RATIO, DEFAULT_SPLIT_SEED, convert_voc_dir, normalize_label_dir, split_dataset,
};
use tracing::info;

/// Fenlei 数据集整理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 把 VOC XML 标注转为 YOLO 标签
  ConvertXml {
    #[arg(long, value_name = "XML_DIR")]
    xml: PathBuf,
    #[arg(long, value_name = "OUTPUT")]
    output: PathBuf,
    /// 类别表，每行一个类别；缺省时按字母序自动生成 classes.txt
    #[arg(long, value_name = "CLASSES")]
    classes: Option<PathBuf>,
  },
  /// 把 labels/{train,val} 下的像素坐标标签转为相对坐标
  NormalizeLabels {
    /// 数据集根目录
    #[arg(value_name = "ROOT")]
    root: PathBuf,
  },
  /// 划分训练集与验证集
  Split {
    #[arg(long, value_name = "IMAGES")]
    images: PathBuf,
    #[arg(long, value_name = "LABELS")]
    labels: PathBuf,
    #[arg(long, value_name = "OUTPUT")]
    output: PathBuf,
    /// 训练集比例
    #[arg(long, default_value_t = DEFAULT_SPLIT_RATIO, value_name = "RATIO")]
    ratio: f64,
    #[arg(long, default_value_t = DEFAULT_SPLIT_SEED, value_name = "SEED")]
    seed: u64,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  match args.command {
    Command::ConvertXml { xml, output, classes } => {
      let names: Option<Vec<String>> = classes
        .map(|path| {
          std::fs::read_to_string(path).map(|content| {
            content
              .lines()
              .map(str::trim)
              .filter(|l| !l.is_empty())
              .map(str::to_string)
              .collect()
          })
        })
        .transpose()?;
      let stats = convert_voc_dir(&xml, &output, names.as_deref())?;
      info!(
        "转换 {} 个文件, {} 个类别, 跳过 {} 个文件, {} 个目标",
        stats.files, stats.classes, stats.skipped_files, stats.skipped_objects
      );
    }
    Command::NormalizeLabels { root } => {
      let stats = normalize_label_dir(&root)?;
      info!(
        "处理 {} 个标签文件, 跳过 {} 个文件, {} 行",
        stats.files, stats.skipped_files, stats.skipped_lines
      );
    }
    Command::Split {
      images,
      labels,
      output,
      ratio,
      seed,
    } => {
      split_dataset(&images, &labels, &output, ratio, seed)?;
    }
  }

  Ok(())
}
