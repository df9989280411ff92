// 该文件是 Kanjian （看见） 项目的一部分。
// src/decode.rs - 检测结果解码
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

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{label::LabelTable, proximity::Proximity, resolve::ResolvedOutputs};

/// 默认置信度阈值，分数必须严格大于该值
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;
/// YOLO 模型输入边长
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// 四个坐标都小于该值时视为归一化坐标
const NORMALIZED_COORD_LIMIT: f32 = 2.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("模型返回单个张量 {shape:?}，不支持解析合并输出")]
  UnresolvedOutputShape { shape: Vec<usize> },
  #[error("无法识别框、分数和类别输出张量")]
  OutputsUnresolved,
  #[error("分类模型应返回单个张量，实际返回 {count} 个")]
  UnexpectedClassifierOutput { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeConfig {
  /// 模型输入边长 S（正方形）
  pub input_size: u32,
  pub threshold: f32,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }
}

/// 像素坐标下的边界框，相对于 S×S 输入
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  /// 由 (y1, x1, y2, x2) 构造；宽高可能为负，原样保留
  pub fn from_corners(y1: f32, x1: f32, y2: f32, x2: f32) -> Self {
    Self {
      x: x1,
      y: y1,
      width: x2 - x1,
      height: y2 - y1,
    }
  }
}

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  /// 类别名称
  pub label: String,
  /// 类别索引，越界时为 None
  pub class_id: Option<usize>,
  /// 置信度
  pub confidence: f32,
  pub bbox: BBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResult {
  pub input_size: u32,
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 主检测结果：模型输出顺序中的第一个
  pub fn primary(&self) -> Option<&Detection> {
    self.items.first()
  }

  pub fn proximity(&self) -> Option<Proximity> {
    self
      .primary()
      .map(|d| Proximity::from_width(d.bbox.width, self.input_size))
  }
}

/// 将一个坐标四元组换算到像素坐标
fn to_pixels(raw: [f32; 4], input_size: u32) -> [f32; 4] {
  if raw.iter().all(|&v| v < NORMALIZED_COORD_LIMIT) {
    let scale = input_size as f32;
    raw.map(|v| v * scale)
  } else {
    raw
  }
}

/// 解码已识别的输出张量
///
/// 保留模型原始的槽位顺序，不排序，不做 NMS。
pub fn decode_detections(
  outputs: &ResolvedOutputs<'_>,
  config: &DecodeConfig,
  labels: &LabelTable,
) -> DetectResult {
  let num_slots = outputs.boxes.dim(1).unwrap_or(0);
  let boxes = outputs.boxes.data();
  let scores = outputs.scores.data();
  let classes = outputs.classes.data();

  let mut items = Vec::new();
  let mut max_score = 0.0f32;

  for i in 0..num_slots {
    let Some(&score) = scores.get(i) else {
      debug!("槽位 {} 缺少分数，停止解码", i);
      break;
    };
    if score > max_score {
      max_score = score;
    }
    if !(score > config.threshold) {
      continue;
    }

    let Some(raw) = boxes.get(i * 4..i * 4 + 4) else {
      debug!("槽位 {} 缺少框坐标，停止解码", i);
      break;
    };
    let [y1, x1, y2, x2] = to_pixels([raw[0], raw[1], raw[2], raw[3]], config.input_size);

    let class_id = classes.get(i).and_then(|&c| labels.class_id(c));

    items.push(Detection {
      label: labels.label_or_unknown(class_id).to_string(),
      class_id,
      confidence: score,
      bbox: BBox::from_corners(y1, x1, y2, x2),
    });
  }

  debug!("最高分数: {}", max_score);
  debug!("检测到 {} 个物体", items.len());

  DetectResult {
    input_size: config.input_size,
    items: items.into_boxed_slice(),
  }
}
