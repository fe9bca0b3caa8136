// 该文件是 Fenlei （垃圾分类） 项目的一部分。
// src/taxonomy.rs - 大类/小类两级分类表
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

use std::{borrow::Cow, collections::BTreeMap, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// 未映射到大类时使用的大类索引
pub const UNKNOWN_COARSE_INDEX: i32 = -1;
/// 未知大类的名称
pub const UNKNOWN_COARSE_NAME: &str = "unknown coarse category";

#[derive(Error, Debug)]
pub enum TaxonomyError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("YAML 解析错误: {0}")]
  YamlError(#[from] serde_yaml::Error),
}

/// 两级分类表：小类名称、小类到大类的映射、大类名称
///
/// 所有查询都不会失败，无法解析的索引会退化为占位名称。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
  small_category_names: BTreeMap<u32, String>,
  big_category_mapping: BTreeMap<u32, i32>,
  big_category_names: BTreeMap<i32, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamesYaml {
  Sequence(Vec<String>),
  Mapping(BTreeMap<u32, String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaxonomyYaml {
  names: Option<NamesYaml>,
  big_category_mapping: BTreeMap<u32, i32>,
  big_category_names: BTreeMap<i32, String>,
}

impl Taxonomy {
  pub fn new(
    small_category_names: BTreeMap<u32, String>,
    big_category_mapping: BTreeMap<u32, i32>,
    big_category_names: BTreeMap<i32, String>,
  ) -> Self {
    Self {
      small_category_names,
      big_category_mapping,
      big_category_names,
    }
  }

  /// 从数据集 YAML 文本解析分类表
  ///
  /// `names` 既可以是列表，也可以是 `索引: 名称` 的映射。
  pub fn from_yaml_str(content: &str) -> Result<Self, TaxonomyError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let parsed: TaxonomyYaml = serde_yaml::from_str(content)?;

    let small_category_names = match parsed.names {
      Some(NamesYaml::Sequence(names)) => names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (idx as u32, name))
        .collect(),
      Some(NamesYaml::Mapping(names)) => names,
      None => BTreeMap::new(),
    };

    Ok(Self::new(
      small_category_names,
      parsed.big_category_mapping,
      parsed.big_category_names,
    ))
  }

  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TaxonomyError> {
    let path = path.as_ref();
    info!("加载分类配置: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let taxonomy = Self::from_yaml_str(&content)?;
    info!(
      "分类配置加载成功，包含 {} 个小类别, {} 个大类别",
      taxonomy.small_category_names.len(),
      taxonomy.big_category_names.len()
    );
    Ok(taxonomy)
  }

  pub fn fine_name(&self, fine_index: u32) -> Cow<'_, str> {
    match self.small_category_names.get(&fine_index) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(format!("unknown category({})", fine_index)),
    }
  }

  pub fn coarse_index(&self, fine_index: u32) -> i32 {
    self
      .big_category_mapping
      .get(&fine_index)
      .copied()
      .unwrap_or(UNKNOWN_COARSE_INDEX)
  }

  pub fn coarse_name(&self, coarse_index: i32) -> Cow<'_, str> {
    if coarse_index == UNKNOWN_COARSE_INDEX {
      return Cow::Borrowed(UNKNOWN_COARSE_NAME);
    }
    self
      .big_category_names
      .get(&coarse_index)
      .map(|name| Cow::Borrowed(name.as_str()))
      .unwrap_or(Cow::Borrowed(UNKNOWN_COARSE_NAME))
  }

  /// `大类/小类` 形式的标签
  pub fn label(&self, fine_index: u32) -> String {
    let coarse = self.coarse_name(self.coarse_index(fine_index));
    format!("{}/{}", coarse, self.fine_name(fine_index))
  }

  pub fn num_fine_classes(&self) -> usize {
    self.small_category_names.len()
  }

  pub fn num_coarse_classes(&self) -> usize {
    self.big_category_names.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const LAJIFENLEI_YAML: &str = "\u{feff}path: datasets
train: images/train
val: images/val
nc: 3
names:
  0: 污损塑料
  1: 剩饭剩菜
  2: 充电宝
big_category_mapping:
  0: 0
  1: 1
  2: 2
big_category_names:
  0: 其他垃圾
  1: 厨余垃圾
  2: 可回收物
";

  #[test]
  fn parses_mapping_yaml_with_bom() {
    let taxonomy = Taxonomy::from_yaml_str(LAJIFENLEI_YAML).unwrap();
    assert_eq!(taxonomy.num_fine_classes(), 3);
    assert_eq!(taxonomy.num_coarse_classes(), 3);
    assert_eq!(taxonomy.label(1), "厨余垃圾/剩饭剩菜");
    assert_eq!(taxonomy.label(2), "可回收物/充电宝");
  }

  #[test]
  fn parses_sequence_names() {
    let yaml = "names: [banana peel, bottle]\nbig_category_mapping: {0: 1}\nbig_category_names: {1: kitchen waste}\n";
    let taxonomy = Taxonomy::from_yaml_str(yaml).unwrap();
    assert_eq!(taxonomy.fine_name(1), "bottle");
    assert_eq!(taxonomy.label(0), "kitchen waste/banana peel");
    assert_eq!(taxonomy.label(1), "unknown coarse category/bottle");
  }

  #[test]
  fn missing_tables_default_to_empty() {
    let taxonomy = Taxonomy::from_yaml_str("nc: 0\n").unwrap();
    assert_eq!(taxonomy, Taxonomy::default());
    assert_eq!(taxonomy.label(3), "unknown coarse category/unknown category(3)");
  }

  #[test]
  fn mapped_but_unnamed_coarse_index_falls_back() {
    let taxonomy = Taxonomy::new(
      BTreeMap::from([(0, "eggshell".to_string())]),
      BTreeMap::from([(0, 9)]),
      BTreeMap::new(),
    );
    assert_eq!(taxonomy.coarse_index(0), 9);
    assert_eq!(taxonomy.coarse_name(9), UNKNOWN_COARSE_NAME);
  }

  #[test]
  fn malformed_yaml_is_an_error() {
    let err = Taxonomy::from_yaml_str("names: [unterminated").unwrap_err();
    assert!(matches!(err, TaxonomyError::YamlError(_)));
  }
}
