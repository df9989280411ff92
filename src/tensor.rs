// 该文件是 Kanjian （看见） 项目的一部分。
// src/tensor.rs - 推理结果张量定义
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("张量形状 {shape:?} 需要 {expected} 个元素，实际为 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
}

/// 单个输出张量：形状 + 扁平的 f32 缓冲区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRepr", into = "TensorRepr")]
pub struct Tensor {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

impl Tensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::ShapeMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape: shape.into_boxed_slice(),
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  /// 第 `axis` 维的大小，维度不存在时返回 None
  pub fn dim(&self, axis: usize) -> Option<usize> {
    self.shape.get(axis).copied()
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

#[derive(Serialize, Deserialize)]
struct TensorRepr {
  shape: Vec<usize>,
  data: Vec<f32>,
}

impl TryFrom<TensorRepr> for Tensor {
  type Error = TensorError;

  fn try_from(repr: TensorRepr) -> Result<Self, Self::Error> {
    Tensor::new(repr.shape, repr.data)
  }
}

impl From<Tensor> for TensorRepr {
  fn from(tensor: Tensor) -> Self {
    TensorRepr {
      shape: tensor.shape.into_vec(),
      data: tensor.data.into_vec(),
    }
  }
}

/// 一次推理调用返回的全部张量
///
/// 推理库可能返回单个张量、有序张量列表或按名称索引的张量映射。
/// `Named` 保留插入顺序，即映射的自然值顺序。
#[derive(Debug, Clone, PartialEq)]
pub enum RawInferenceResult {
  Single(Tensor),
  List(Vec<Tensor>),
  Named(Vec<(String, Tensor)>),
}

impl RawInferenceResult {
  /// 按顺序列出集合中的张量；单张量结果返回 None
  pub fn ordered(&self) -> Option<Vec<&Tensor>> {
    match self {
      RawInferenceResult::Single(_) => None,
      RawInferenceResult::List(tensors) => Some(tensors.iter().collect()),
      RawInferenceResult::Named(tensors) => Some(tensors.iter().map(|(_, t)| t).collect()),
    }
  }

  pub fn by_index(&self, index: usize) -> Option<&Tensor> {
    match self {
      RawInferenceResult::Single(_) => None,
      RawInferenceResult::List(tensors) => tensors.get(index),
      RawInferenceResult::Named(tensors) => tensors.get(index).map(|(_, t)| t),
    }
  }

  pub fn by_name(&self, name: &str) -> Option<&Tensor> {
    match self {
      RawInferenceResult::Named(tensors) => tensors
        .iter()
        .find_map(|(n, t)| (n == name).then_some(t)),
      _ => None,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      RawInferenceResult::Single(_) => 1,
      RawInferenceResult::List(tensors) => tensors.len(),
      RawInferenceResult::Named(tensors) => tensors.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 各张量形状，用于日志
  pub fn shapes(&self) -> Vec<&[usize]> {
    match self {
      RawInferenceResult::Single(tensor) => vec![tensor.shape()],
      RawInferenceResult::List(tensors) => tensors.iter().map(Tensor::shape).collect(),
      RawInferenceResult::Named(tensors) => tensors.iter().map(|(_, t)| t.shape()).collect(),
    }
  }
}

/// 推理结果的 JSON 转储格式
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceDump {
  Single { tensor: Tensor },
  List { tensors: Vec<Tensor> },
  Named { tensors: Vec<NamedTensor> },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedTensor {
  pub name: String,
  #[serde(flatten)]
  pub tensor: Tensor,
}

impl From<InferenceDump> for RawInferenceResult {
  fn from(dump: InferenceDump) -> Self {
    match dump {
      InferenceDump::Single { tensor } => RawInferenceResult::Single(tensor),
      InferenceDump::List { tensors } => RawInferenceResult::List(tensors),
      InferenceDump::Named { tensors } => RawInferenceResult::Named(
        tensors
          .into_iter()
          .map(|NamedTensor { name, tensor }| (name, tensor))
          .collect(),
      ),
    }
  }
}

impl From<RawInferenceResult> for InferenceDump {
  fn from(result: RawInferenceResult) -> Self {
    match result {
      RawInferenceResult::Single(tensor) => InferenceDump::Single { tensor },
      RawInferenceResult::List(tensors) => InferenceDump::List { tensors },
      RawInferenceResult::Named(tensors) => InferenceDump::Named {
        tensors: tensors
          .into_iter()
          .map(|(name, tensor)| NamedTensor { name, tensor })
          .collect(),
      },
    }
  }
}
