// 该文件是 Kanjian （看见） 项目的一部分。
// src/resolve.rs - 输出张量角色识别
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

use std::str::FromStr;

use tracing::{debug, warn};

use crate::{
  decode::DecodeError,
  tensor::{RawInferenceResult, Tensor},
};

/// 判断是否为整数时采样的元素个数
const INTEGRAL_SAMPLE_LEN: usize = 20;

/// 框张量的最后一维
const BOX_COORDS: usize = 4;

/// 已识别角色的三个输出张量，均借用自同一次推理结果
#[derive(Debug, Clone, Copy)]
pub struct ResolvedOutputs<'a> {
  pub boxes: &'a Tensor,
  pub scores: &'a Tensor,
  pub classes: &'a Tensor,
}

/// 在集合中定位张量的方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorKey {
  Index(usize),
  Name(String),
}

impl FromStr for TensorKey {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.parse::<usize>() {
      Ok(index) => TensorKey::Index(index),
      Err(_) => TensorKey::Name(s.to_string()),
    })
  }
}

/// 显式声明的输出布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
  pub boxes: TensorKey,
  pub scores: TensorKey,
  pub classes: TensorKey,
}

/// 角色识别策略
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolveStrategy {
  /// 根据形状和数值特征推断
  #[default]
  Heuristic,
  /// 按声明的布局直接取用，不做推断
  Explicit(OutputSchema),
}

impl ResolveStrategy {
  pub fn resolve<'a>(
    &self,
    result: &'a RawInferenceResult,
  ) -> Result<ResolvedOutputs<'a>, DecodeError> {
    if let RawInferenceResult::Single(tensor) = result {
      debug!("模型返回单个张量: {:?}", tensor.shape());
      return Err(DecodeError::UnresolvedOutputShape {
        shape: tensor.shape().to_vec(),
      });
    }

    match self {
      ResolveStrategy::Heuristic => resolve_heuristic(result),
      ResolveStrategy::Explicit(schema) => resolve_explicit(result, schema),
    }
  }
}

fn lookup<'a>(result: &'a RawInferenceResult, key: &TensorKey) -> Option<&'a Tensor> {
  match key {
    TensorKey::Index(index) => result.by_index(*index),
    TensorKey::Name(name) => result.by_name(name),
  }
}

fn resolve_explicit<'a>(
  result: &'a RawInferenceResult,
  schema: &OutputSchema,
) -> Result<ResolvedOutputs<'a>, DecodeError> {
  let boxes = lookup(result, &schema.boxes);
  let scores = lookup(result, &schema.scores);
  let classes = lookup(result, &schema.classes);
  debug!(
    "按声明布局取用: 框={}, 分数={}, 类别={}",
    boxes.is_some(),
    scores.is_some(),
    classes.is_some()
  );
  complete(boxes, scores, classes)
}

fn complete<'a>(
  boxes: Option<&'a Tensor>,
  scores: Option<&'a Tensor>,
  classes: Option<&'a Tensor>,
) -> Result<ResolvedOutputs<'a>, DecodeError> {
  match (boxes, scores, classes) {
    (Some(boxes), Some(scores), Some(classes)) => Ok(ResolvedOutputs {
      boxes,
      scores,
      classes,
    }),
    _ => Err(DecodeError::OutputsUnresolved),
  }
}

fn resolve_heuristic(result: &RawInferenceResult) -> Result<ResolvedOutputs<'_>, DecodeError> {
  let Some(tensors) = result.ordered() else {
    return Err(DecodeError::OutputsUnresolved);
  };

  debug!("模型返回 {} 个张量", tensors.len());
  for (i, t) in tensors.iter().enumerate() {
    debug!("张量 {}: 形状 {:?}", i, t.shape());
  }

  let boxes_idx = tensors
    .iter()
    .position(|t| t.rank() == 3 && t.dim(2) == Some(BOX_COORDS));

  let Some(boxes_idx) = boxes_idx else {
    warn!("未找到形状为 [1, N, 4] 的框张量，按索引 0, 1, 2 取用");
    return complete(
      tensors.first().copied(),
      tensors.get(1).copied(),
      tensors.get(2).copied(),
    );
  };

  let boxes = tensors[boxes_idx];
  let num_slots = boxes.dim(1);
  let candidates: Vec<&Tensor> = tensors
    .iter()
    .enumerate()
    .filter(|&(i, t)| i != boxes_idx && t.rank() == 2 && t.dim(1) == num_slots)
    .map(|(_, t)| *t)
    .collect();

  let (scores, classes) = match candidates.as_slice() {
    [first, second, ..] => {
      let (scores, classes) = assign_scores_classes(*first, *second);
      (Some(scores), Some(classes))
    }
    [only] => (Some(*only), None),
    [] => (None, None),
  };

  complete(Some(boxes), scores, classes)
}

/// 候选张量的数值特征
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueProfile {
  /// 前若干个元素是否全为整数
  pub integral: bool,
  /// 全部元素的最大值，空张量为负无穷，含 NaN 时为 NaN
  pub max: f32,
}

impl ValueProfile {
  pub fn sniff(tensor: &Tensor) -> Self {
    let data = tensor.data();
    let integral = data
      .iter()
      .take(INTEGRAL_SAMPLE_LEN)
      .all(|v| v.floor() == *v);
    let max = if data.iter().any(|v| v.is_nan()) {
      f32::NAN
    } else {
      data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    };
    Self { integral, max }
  }

  fn looks_like_classes(&self, other: &ValueProfile) -> bool {
    self.max > 1.0 || (self.integral && !other.integral)
  }
}

/// 两个候选中哪个被判定为类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
  FirstIsClasses,
  SecondIsClasses,
  Ambiguous,
}

impl Assignment {
  pub fn infer(first: &ValueProfile, second: &ValueProfile) -> Self {
    if first.looks_like_classes(second) {
      Assignment::FirstIsClasses
    } else if second.looks_like_classes(first) {
      Assignment::SecondIsClasses
    } else {
      Assignment::Ambiguous
    }
  }
}

/// 返回 (scores, classes)
fn assign_scores_classes<'a>(first: &'a Tensor, second: &'a Tensor) -> (&'a Tensor, &'a Tensor) {
  let p1 = ValueProfile::sniff(first);
  let p2 = ValueProfile::sniff(second);
  debug!("候选 1: max={}, 整数={}", p1.max, p1.integral);
  debug!("候选 2: max={}, 整数={}", p2.max, p2.integral);

  match Assignment::infer(&p1, &p2) {
    Assignment::FirstIsClasses => {
      debug!("判定: 候选 1 是类别, 候选 2 是分数");
      (second, first)
    }
    Assignment::SecondIsClasses => {
      debug!("判定: 候选 2 是类别, 候选 1 是分数");
      (first, second)
    }
    Assignment::Ambiguous => {
      debug!("无法区分, 默认候选 1 是分数, 候选 2 是类别");
      (first, second)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tensor(shape: &[usize], data: &[f32]) -> Tensor {
    Tensor::new(shape.to_vec(), data.to_vec()).unwrap()
  }

  fn boxes(n: usize) -> Tensor {
    tensor(&[1, n, 4], &vec![0.1; n * 4])
  }

  #[test]
  fn single_tensor_is_never_resolved() {
    for shape in [vec![1, 25200, 85], vec![1, 3, 4], vec![1, 3]] {
      let len = shape.iter().product::<usize>();
      let result = RawInferenceResult::Single(Tensor::new(shape.clone(), vec![0.0; len]).unwrap());
      for strategy in [
        ResolveStrategy::Heuristic,
        ResolveStrategy::Explicit(OutputSchema {
          boxes: TensorKey::Index(0),
          scores: TensorKey::Index(1),
          classes: TensorKey::Index(2),
        }),
      ] {
        assert_eq!(
          strategy.resolve(&result).unwrap_err(),
          DecodeError::UnresolvedOutputShape {
            shape: shape.clone()
          }
        );
      }
    }
  }

  #[test]
  fn integer_candidate_above_one_is_classes_in_either_order() {
    let scores = tensor(&[1, 3], &[0.1, 0.25, 0.9]);
    let classes = tensor(&[1, 3], &[0.0, 16.0, 2.0]);

    let forward = RawInferenceResult::List(vec![boxes(3), classes.clone(), scores.clone()]);
    let resolved = ResolveStrategy::Heuristic.resolve(&forward).unwrap();
    assert_eq!(resolved.classes, &classes);
    assert_eq!(resolved.scores, &scores);

    let reverse = RawInferenceResult::List(vec![scores.clone(), boxes(3), classes.clone()]);
    let resolved = ResolveStrategy::Heuristic.resolve(&reverse).unwrap();
    assert_eq!(resolved.classes, &classes);
    assert_eq!(resolved.scores, &scores);
  }

  #[test]
  fn integral_candidate_wins_when_max_is_low() {
    // 两者最大值都不超过 1，只有一个是整数
    let scores = tensor(&[1, 2], &[0.5, 0.75]);
    let classes = tensor(&[1, 2], &[0.0, 1.0]);
    let result = RawInferenceResult::List(vec![boxes(2), scores.clone(), classes.clone()]);

    let resolved = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    assert_eq!(resolved.scores, &scores);
    assert_eq!(resolved.classes, &classes);
  }

  #[test]
  fn ambiguous_candidates_default_to_listed_order() {
    let a = tensor(&[1, 2], &[0.5, 0.75]);
    let b = tensor(&[1, 2], &[0.25, 0.125]);
    assert_eq!(
      Assignment::infer(&ValueProfile::sniff(&a), &ValueProfile::sniff(&b)),
      Assignment::Ambiguous
    );

    let result = RawInferenceResult::List(vec![a.clone(), b.clone(), boxes(2)]);
    let first = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    let second = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    assert_eq!(first.scores, &a);
    assert_eq!(first.classes, &b);
    assert!(std::ptr::eq(first.scores, second.scores));
  }

  #[test]
  fn integral_sampling_only_looks_at_first_twenty() {
    let mut data = vec![1.0; 20];
    data.push(0.5);
    let t = tensor(&[1, 21], &data);
    assert!(ValueProfile::sniff(&t).integral);
  }

  #[test]
  fn mapping_is_resolved_in_value_order() {
    let scores = tensor(&[1, 2], &[0.3, 0.6]);
    let classes = tensor(&[1, 2], &[3.0, 7.0]);
    let result = RawInferenceResult::Named(vec![
      ("num_detections".into(), tensor(&[1], &[2.0])),
      ("detection_classes".into(), classes.clone()),
      ("detection_boxes".into(), boxes(2)),
      ("detection_scores".into(), scores.clone()),
    ]);

    let resolved = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    assert_eq!(resolved.scores, &scores);
    assert_eq!(resolved.classes, &classes);
    assert_eq!(resolved.boxes.shape(), &[1, 2, 4]);
  }

  #[test]
  fn single_candidate_leaves_classes_unassigned() {
    let result = RawInferenceResult::List(vec![
      boxes(2),
      tensor(&[1, 2], &[0.3, 0.6]),
      tensor(&[1, 5], &[0.0; 5]),
    ]);
    assert_eq!(
      ResolveStrategy::Heuristic.resolve(&result).unwrap_err(),
      DecodeError::OutputsUnresolved
    );
  }

  #[test]
  fn positional_fallback_without_box_shape() {
    let a = tensor(&[8], &[0.0; 8]);
    let b = tensor(&[2], &[0.9, 0.1]);
    let c = tensor(&[2], &[1.0, 2.0]);
    let result = RawInferenceResult::List(vec![a.clone(), b.clone(), c.clone()]);

    let resolved = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    assert_eq!(resolved.boxes, &a);
    assert_eq!(resolved.scores, &b);
    assert_eq!(resolved.classes, &c);

    let short = RawInferenceResult::List(vec![a, b]);
    assert_eq!(
      ResolveStrategy::Heuristic.resolve(&short).unwrap_err(),
      DecodeError::OutputsUnresolved
    );
  }

  #[test]
  fn explicit_schema_bypasses_heuristic() {
    // 按推断规则候选 1 会被当作类别，声明布局则直接采用
    let odd_scores = tensor(&[1, 2], &[3.0, 4.0]);
    let odd_classes = tensor(&[1, 2], &[0.5, 0.25]);
    let result = RawInferenceResult::Named(vec![
      ("s".into(), odd_scores.clone()),
      ("c".into(), odd_classes.clone()),
      ("b".into(), boxes(2)),
    ]);
    let strategy = ResolveStrategy::Explicit(OutputSchema {
      boxes: "b".parse().unwrap(),
      scores: "s".parse().unwrap(),
      classes: "1".parse().unwrap(),
    });

    let resolved = strategy.resolve(&result).unwrap();
    assert_eq!(resolved.scores, &odd_scores);
    assert_eq!(resolved.classes, &odd_classes);

    let missing = ResolveStrategy::Explicit(OutputSchema {
      boxes: TensorKey::Name("nope".into()),
      scores: TensorKey::Index(0),
      classes: TensorKey::Index(1),
    });
    assert_eq!(
      missing.resolve(&result).unwrap_err(),
      DecodeError::OutputsUnresolved
    );
  }

  #[test]
  fn nan_candidate_is_never_classes_by_max() {
    let noisy = tensor(&[1, 3], &[0.5, f32::NAN, 3.0]);
    let profile = ValueProfile::sniff(&noisy);
    assert!(profile.max.is_nan());

    let other = tensor(&[1, 3], &[0.25, 0.5, 0.75]);
    assert_eq!(
      Assignment::infer(&profile, &ValueProfile::sniff(&other)),
      Assignment::Ambiguous
    );
  }

  #[test]
  fn only_first_two_candidates_are_considered() {
    let scores = tensor(&[1, 2], &[0.9, 0.4]);
    let classes = tensor(&[1, 2], &[5.0, 2.0]);
    let extra = tensor(&[1, 2], &[7.0, 9.0]);
    let result = RawInferenceResult::List(vec![
      boxes(2),
      scores.clone(),
      classes.clone(),
      extra.clone(),
    ]);

    let resolved = ResolveStrategy::Heuristic.resolve(&result).unwrap();
    assert_eq!(resolved.scores, &scores);
    assert_eq!(resolved.classes, &classes);

    // 额外的候选排在前面时会挤掉真正的分数
    let shadowed = RawInferenceResult::List(vec![boxes(2), extra.clone(), classes, scores]);
    let resolved = ResolveStrategy::Heuristic.resolve(&shadowed).unwrap();
    assert_eq!(resolved.classes, &extra);
  }
}
