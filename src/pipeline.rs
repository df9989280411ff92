// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 解码管线定义
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

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classify::{CLASSIFIER_INPUT_SIZE, ClassifyConfig, ClassifyResult, decode_classes},
  decode::{DecodeConfig, DecodeError, DetectResult, decode_detections},
  label::LabelTable,
  resolve::{OutputSchema, ResolveStrategy},
  speech::Announce,
  tensor::{RawInferenceResult, Tensor},
};

/// 把一次推理的原始输出解码为结构化结果
///
/// 推理结果按值传入，解码结束时无论成功与否都会被释放。
pub trait Pipeline {
  type Output;

  fn decode(&self, result: RawInferenceResult) -> Result<Self::Output, DecodeError>;
  fn input_size(&self) -> u32;
}

#[derive(Error, Debug)]
pub enum PipelineConfigError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidParameter { key: String, value: String },
  #[error("输出布局声明无效: {0}，格式应为 boxes:<键>,scores:<键>,classes:<键>")]
  InvalidSchema(String),
  #[error("标签文件读取失败 {path:?}: {source}")]
  LabelFile {
    path: PathBuf,
    source: std::io::Error,
  },
}

fn invalid(key: &str, value: &str) -> PipelineConfigError {
  PipelineConfigError::InvalidParameter {
    key: key.to_string(),
    value: value.to_string(),
  }
}

fn parse_threshold(value: &str) -> Result<f32, PipelineConfigError> {
  value
    .parse::<f32>()
    .ok()
    .filter(|v| v.is_finite())
    .ok_or_else(|| invalid("threshold", value))
}

fn parse_size(value: &str) -> Result<u32, PipelineConfigError> {
  value
    .parse::<u32>()
    .ok()
    .filter(|&v| v > 0)
    .ok_or_else(|| invalid("size", value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, PipelineConfigError> {
  match value {
    "" | "1" | "true" | "yes" => Ok(true),
    "0" | "false" | "no" => Ok(false),
    _ => Err(invalid(key, value)),
  }
}

/// 解析 `boxes:0,scores:detection_scores,classes:2`
pub fn parse_schema(value: &str) -> Result<OutputSchema, PipelineConfigError> {
  let (mut boxes, mut scores, mut classes) = (None, None, None);
  for part in value.split(',') {
    let (role, key) = part
      .split_once(':')
      .ok_or_else(|| PipelineConfigError::InvalidSchema(value.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
      return Err(PipelineConfigError::InvalidSchema(value.to_string()));
    }
    let slot = match role.trim() {
      "boxes" => &mut boxes,
      "scores" => &mut scores,
      "classes" => &mut classes,
      _ => return Err(PipelineConfigError::InvalidSchema(value.to_string())),
    };
    *slot = key.parse().ok();
  }

  match (boxes, scores, classes) {
    (Some(boxes), Some(scores), Some(classes)) => Ok(OutputSchema {
      boxes,
      scores,
      classes,
    }),
    _ => Err(PipelineConfigError::InvalidSchema(value.to_string())),
  }
}

/// 检测模型管线（YOLO）
#[derive(Debug, Clone)]
pub struct DetectorPipeline {
  strategy: ResolveStrategy,
  config: DecodeConfig,
  labels: LabelTable,
}

impl DetectorPipeline {
  pub fn builder() -> DetectorPipelineBuilder {
    DetectorPipelineBuilder::default()
  }

  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  pub fn strategy(&self) -> &ResolveStrategy {
    &self.strategy
  }
}

impl Pipeline for DetectorPipeline {
  type Output = DetectResult;

  fn decode(&self, result: RawInferenceResult) -> Result<Self::Output, DecodeError> {
    debug!("推理结果张量形状: {:?}", result.shapes());
    let outputs = self.strategy.resolve(&result)?;
    Ok(decode_detections(&outputs, &self.config, &self.labels))
  }

  fn input_size(&self) -> u32 {
    self.config.input_size
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectorPipelineBuilder {
  strategy: ResolveStrategy,
  config: DecodeConfig,
  labels: Option<LabelTable>,
}

impl FromUrlWithScheme for DetectorPipelineBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for DetectorPipelineBuilder {
  type Error = PipelineConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PipelineConfigError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut builder = DetectorPipelineBuilder::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "threshold" => builder = builder.threshold(parse_threshold(&value)?),
        "size" => builder = builder.input_size(parse_size(&value)?),
        "schema" => builder = builder.strategy(ResolveStrategy::Explicit(parse_schema(&value)?)),
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl DetectorPipelineBuilder {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.config.threshold = threshold;
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.config.input_size = input_size;
    self
  }

  pub fn strategy(mut self, strategy: ResolveStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn build(self) -> DetectorPipeline {
    info!(
      "检测管线: 输入 {}x{}, 阈值 {}, 策略 {:?}",
      self.config.input_size, self.config.input_size, self.config.threshold, self.strategy
    );
    DetectorPipeline {
      strategy: self.strategy,
      config: self.config,
      labels: self.labels.unwrap_or_default(),
    }
  }
}

/// 分类模型管线（MobileNet）
#[derive(Debug, Clone)]
pub struct ClassifierPipeline {
  input_size: u32,
  config: ClassifyConfig,
  labels: LabelTable,
}

impl ClassifierPipeline {
  pub fn builder() -> ClassifierPipelineBuilder {
    ClassifierPipelineBuilder::default()
  }
}

/// 分类模型只应返回一个张量
fn sole_tensor(result: &RawInferenceResult) -> Result<&Tensor, DecodeError> {
  match result {
    RawInferenceResult::Single(tensor) => Ok(tensor),
    other => match other.ordered().as_deref() {
      Some(&[tensor]) => Ok(tensor),
      _ => Err(DecodeError::UnexpectedClassifierOutput { count: other.len() }),
    },
  }
}

impl Pipeline for ClassifierPipeline {
  type Output = ClassifyResult;

  fn decode(&self, result: RawInferenceResult) -> Result<Self::Output, DecodeError> {
    debug!("推理结果张量形状: {:?}", result.shapes());
    let tensor = sole_tensor(&result)?;
    Ok(decode_classes(tensor, &self.config, &self.labels))
  }

  fn input_size(&self) -> u32 {
    self.input_size
  }
}

#[derive(Debug, Clone)]
pub struct ClassifierPipelineBuilder {
  input_size: u32,
  config: ClassifyConfig,
  labels_path: Option<PathBuf>,
}

impl Default for ClassifierPipelineBuilder {
  fn default() -> Self {
    Self {
      input_size: CLASSIFIER_INPUT_SIZE,
      config: ClassifyConfig::default(),
      labels_path: None,
    }
  }
}

impl FromUrlWithScheme for ClassifierPipelineBuilder {
  const SCHEME: &'static str = "mobilenet";
}

impl FromUrl for ClassifierPipelineBuilder {
  type Error = PipelineConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PipelineConfigError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut builder = ClassifierPipelineBuilder::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => builder.input_size = parse_size(&value)?,
        "labels" => builder.labels_path = Some(PathBuf::from(value.as_ref())),
        "top_k" => {
          let top_k = value
            .parse::<usize>()
            .ok()
            .filter(|&k| k > 0)
            .ok_or_else(|| invalid("top_k", &value))?;
          builder = builder.top_k(top_k);
        }
        "softmax" => builder = builder.softmax(parse_flag("softmax", &value)?),
        other => debug!("忽略未知参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl ClassifierPipelineBuilder {
  pub fn labels_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.labels_path = Some(path.into());
    self
  }

  pub fn top_k(mut self, top_k: usize) -> Self {
    self.config.top_k = top_k;
    self
  }

  pub fn softmax(mut self, softmax: bool) -> Self {
    self.config.softmax = softmax;
    self
  }

  pub fn build(self) -> Result<ClassifierPipeline, PipelineConfigError> {
    let labels = match self.labels_path {
      Some(path) => {
        info!("加载标签文件: {:?}", path);
        LabelTable::from_file(&path)
          .map_err(|source| PipelineConfigError::LabelFile { path, source })?
      }
      None => LabelTable::from_lines(""),
    };
    debug!("标签数量: {}", labels.len());
    info!(
      "分类管线: 输入 {}x{}, top_k {}, softmax {}",
      self.input_size, self.input_size, self.config.top_k, self.config.softmax
    );

    Ok(ClassifierPipeline {
      input_size: self.input_size,
      config: self.config,
      labels,
    })
  }
}

/// 两种模型的解码结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
  Detected(DetectResult),
  Classified(ClassifyResult),
}

impl Announce for Outcome {
  fn announcement(&self) -> String {
    match self {
      Outcome::Detected(result) => result.announcement(),
      Outcome::Classified(result) => result.announcement(),
    }
  }
}

pub enum PipelineWrapper {
  Detector(DetectorPipeline),
  Classifier(ClassifierPipeline),
}

impl FromUrl for PipelineWrapper {
  type Error = PipelineConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DetectorPipelineBuilder::SCHEME => Ok(PipelineWrapper::Detector(
        DetectorPipelineBuilder::from_url(url)?.build(),
      )),
      ClassifierPipelineBuilder::SCHEME => Ok(PipelineWrapper::Classifier(
        ClassifierPipelineBuilder::from_url(url)?.build()?,
      )),
      other => Err(PipelineConfigError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Pipeline for PipelineWrapper {
  type Output = Outcome;

  fn decode(&self, result: RawInferenceResult) -> Result<Self::Output, DecodeError> {
    match self {
      PipelineWrapper::Detector(p) => p.decode(result).map(Outcome::Detected),
      PipelineWrapper::Classifier(p) => p.decode(result).map(Outcome::Classified),
    }
  }

  fn input_size(&self) -> u32 {
    match self {
      PipelineWrapper::Detector(p) => p.input_size(),
      PipelineWrapper::Classifier(p) => p.input_size(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolve::TensorKey;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn detector_defaults() {
    let pipeline = DetectorPipelineBuilder::from_url(&url("yolo://")).unwrap().build();
    assert_eq!(pipeline.config().threshold, 0.2);
    assert_eq!(pipeline.input_size(), 640);
    assert_eq!(pipeline.strategy(), &ResolveStrategy::Heuristic);
  }

  #[test]
  fn detector_query_parameters() {
    let pipeline = DetectorPipelineBuilder::from_url(&url(
      "yolo://?threshold=0.35&size=320&schema=boxes:detection_boxes,scores:1,classes:2",
    ))
    .unwrap()
    .build();

    assert_eq!(pipeline.config().threshold, 0.35);
    assert_eq!(pipeline.input_size(), 320);
    assert_eq!(
      pipeline.strategy(),
      &ResolveStrategy::Explicit(OutputSchema {
        boxes: TensorKey::Name("detection_boxes".into()),
        scores: TensorKey::Index(1),
        classes: TensorKey::Index(2),
      })
    );
  }

  #[test]
  fn bad_parameters_are_rejected() {
    assert!(matches!(
      DetectorPipelineBuilder::from_url(&url("yolo://?threshold=abc")),
      Err(PipelineConfigError::InvalidParameter { .. })
    ));
    assert!(matches!(
      DetectorPipelineBuilder::from_url(&url("yolo://?size=0")),
      Err(PipelineConfigError::InvalidParameter { .. })
    ));
    assert!(matches!(
      DetectorPipelineBuilder::from_url(&url("yolo://?schema=boxes:0,scores:1")),
      Err(PipelineConfigError::InvalidSchema(_))
    ));
    assert!(matches!(
      DetectorPipelineBuilder::from_url(&url("mobilenet://")),
      Err(PipelineConfigError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn wrapper_dispatches_on_scheme() {
    let detector = PipelineWrapper::from_url(&url("yolo://")).unwrap();
    assert_eq!(detector.input_size(), 640);

    let classifier = PipelineWrapper::from_url(&url("mobilenet://?top_k=5&softmax")).unwrap();
    assert_eq!(classifier.input_size(), 224);

    assert!(matches!(
      PipelineWrapper::from_url(&url("ssd://")),
      Err(PipelineConfigError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn missing_label_file_is_reported() {
    let err = ClassifierPipelineBuilder::default()
      .labels_path("/nonexistent/labels.txt")
      .build()
      .unwrap_err();
    assert!(matches!(err, PipelineConfigError::LabelFile { .. }));
  }

  #[test]
  fn classifier_rejects_multiple_tensors() {
    let pipeline = ClassifierPipeline::builder().build().unwrap();
    let t = Tensor::new(vec![1, 2], vec![0.5, 0.5]).unwrap();

    let err = pipeline
      .decode(RawInferenceResult::List(vec![t.clone(), t.clone()]))
      .unwrap_err();
    assert_eq!(err, DecodeError::UnexpectedClassifierOutput { count: 2 });

    let ok = pipeline.decode(RawInferenceResult::List(vec![t])).unwrap();
    assert_eq!(ok.items.len(), 2);
  }

  #[test]
  fn detector_rejects_single_tensor() {
    let pipeline = DetectorPipeline::builder().build();
    let t = Tensor::new(vec![1, 2, 85], vec![0.0; 170]).unwrap();
    assert_eq!(
      pipeline.decode(RawInferenceResult::Single(t)).unwrap_err(),
      DecodeError::UnresolvedOutputShape {
        shape: vec![1, 2, 85]
      }
    );
  }

  #[test]
  fn detector_uses_supplied_labels() {
    let pipeline = DetectorPipeline::builder()
      .labels(LabelTable::from_lines("door\nstairs"))
      .build();
    let result = RawInferenceResult::List(vec![
      Tensor::new(vec![1, 2, 4], vec![0.0, 0.0, 0.2, 0.2, 0.0, 0.0, 0.4, 0.4]).unwrap(),
      Tensor::new(vec![1, 2], vec![0.9, 0.8]).unwrap(),
      Tensor::new(vec![1, 2], vec![1.0, 2.0]).unwrap(),
    ]);

    let decoded = pipeline.decode(result).unwrap();
    assert_eq!(decoded.items[0].label, "stairs");
    assert_eq!(decoded.items[1].label, "unknown");
  }

  #[test]
  fn classifier_builder_options() {
    let logits = Tensor::new(vec![1, 3], vec![1.0, 3.0, 2.0]).unwrap();

    let pipeline = ClassifierPipeline::builder().top_k(2).softmax(true).build().unwrap();
    let result = pipeline.decode(RawInferenceResult::Single(logits.clone())).unwrap();
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].class_id, 1);
    let total: f32 = result.items.iter().map(|c| c.probability).sum();
    assert!(total < 1.0);

    let raw = ClassifierPipeline::builder().top_k(1).build().unwrap();
    let result = raw.decode(RawInferenceResult::Single(logits)).unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].probability, 3.0);
  }
}
