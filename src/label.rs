// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{borrow::Cow, path::Path};

/// 类别编号越界时使用的标签
pub const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 按类别编号索引的标签表
#[derive(Debug, Clone)]
pub struct LabelTable {
  labels: Vec<Cow<'static, str>>,
}

impl LabelTable {
  pub fn coco() -> Self {
    Self {
      labels: COCO_CLASSES.iter().map(|&l| Cow::Borrowed(l)).collect(),
    }
  }

  /// 每行一个标签，忽略空行
  pub fn from_lines(text: &str) -> Self {
    Self {
      labels: text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Cow::Owned(l.to_string()))
        .collect(),
    }
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(Self::from_lines(&text))
  }

  pub fn get(&self, id: usize) -> Option<&str> {
    self.labels.get(id).map(|l| l.as_ref())
  }

  /// 将原始类别值四舍五入后查表，.5 一律向上取整
  ///
  /// 负数、NaN 和越界编号都返回 None。
  pub fn class_id(&self, raw: f32) -> Option<usize> {
    let rounded = (raw + 0.5).floor();
    if !rounded.is_finite() || rounded < 0.0 {
      return None;
    }
    let id = rounded as usize;
    (id < self.labels.len()).then_some(id)
  }

  pub fn label_or_unknown(&self, id: Option<usize>) -> &str {
    id.and_then(|id| self.get(id)).unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::coco()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_edges() {
    let table = LabelTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.get(0), Some("person"));
    assert_eq!(table.get(79), Some("toothbrush"));
    assert_eq!(table.get(80), None);
  }

  #[test]
  fn class_id_rounds_and_rejects_out_of_range() {
    let table = LabelTable::coco();
    assert_eq!(table.class_id(15.4), Some(15));
    assert_eq!(table.class_id(15.5), Some(16));
    assert_eq!(table.class_id(-0.5), Some(0));
    assert_eq!(table.class_id(-0.51), None);
    assert_eq!(table.class_id(999.0), None);
    assert_eq!(table.class_id(-1.0), None);
    assert_eq!(table.class_id(f32::NAN), None);
    assert_eq!(table.label_or_unknown(table.class_id(999.0)), "unknown");
  }

  #[test]
  fn lines_table_skips_blank_lines() {
    let table = LabelTable::from_lines("tench\n\n goldfish \n");
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1), Some("goldfish"));
  }
}
