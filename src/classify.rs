// 该文件是 Kanjian （看见） 项目的一部分。
// src/classify.rs - 分类结果解码
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
use tracing::debug;

use crate::{label::LabelTable, tensor::Tensor};

/// MobileNet 模型输入边长
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
  pub label: String,
  pub class_id: usize,
  pub probability: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyResult {
  pub items: Box<[Classification]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn top(&self) -> Option<&Classification> {
    self.items.first()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifyConfig {
  pub top_k: usize,
  /// 输出为 logits 时需要先做 softmax
  pub softmax: bool,
}

impl Default for ClassifyConfig {
  fn default() -> Self {
    Self {
      top_k: DEFAULT_TOP_K,
      softmax: false,
    }
  }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|v| v / sum).collect()
}

/// 取概率最高的 top_k 个类别，按概率降序
pub fn decode_classes(
  tensor: &Tensor,
  config: &ClassifyConfig,
  labels: &LabelTable,
) -> ClassifyResult {
  let probabilities = if config.softmax {
    softmax(tensor.data())
  } else {
    tensor.data().to_vec()
  };

  let mut ranked: Vec<(usize, f32)> = probabilities
    .into_iter()
    .enumerate()
    .filter(|(_, p)| !p.is_nan())
    .collect();
  ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
  ranked.truncate(config.top_k);

  let items: Vec<Classification> = ranked
    .into_iter()
    .map(|(class_id, probability)| Classification {
      label: labels.label_or_unknown(Some(class_id)).to_string(),
      class_id,
      probability,
    })
    .collect();

  debug!("分类结果: {:?}", items);

  ClassifyResult {
    items: items.into_boxed_slice(),
  }
}
