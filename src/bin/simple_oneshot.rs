// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分类
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
use clap::Parser;
use url::Url;

use fenlei::{
  FromUrl,
  classifier::ClassifierBuilder,
  input::InputWrapper,
  model::RecordReplay,
  output::{OutputWrapper, font::FontCandidates},
  task::{OneShotTask, Task},
  taxonomy::Taxonomy,
};
use tracing::info;

/// Fenlei 单张图像分类参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类表 YAML 文件
  #[arg(long, env = "FENLEI_TAXONOMY", value_name = "TAXONOMY")]
  pub taxonomy: PathBuf,
  /// 推理后端
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "null:")]
  pub output: Url,
  /// 标注字体，可重复指定，优先于 FENLEI_FONTS
  #[arg(long, value_name = "FONT")]
  pub font: Vec<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("分类表: {}", args.taxonomy.display());
  info!("推理后端: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let taxonomy = Taxonomy::load(&args.taxonomy)?;
  let input = InputWrapper::from_url(&args.input)?;
  let model = RecordReplay::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let classifier = ClassifierBuilder::new(taxonomy)
    .fonts(FontCandidates::new(args.font).chain(FontCandidates::from_env()))
    .build(model);

  let report = OneShotTask.run_task(input, &classifier, output)?;
  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}
