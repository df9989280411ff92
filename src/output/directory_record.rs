// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Records, Render},
  speech::Announce,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存每次拍摄的检测记录和播报文本
///
/// `folder:///path?record=id&always`，`record=id` 记录类别编号而非名称，
/// `always` 时空结果也写入。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  label_with_name: bool,
  frame_counters: Arc<Mutex<u16>>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let label_with_name = !uri.query_pairs().any(|(k, v)| k == "record" && v == "id");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(uri.path(), label_with_name, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, label_with_name: bool, always: bool) -> Self {
    DirectoryRecordOutput {
      directory: directory.into(),
      label_with_name,
      frame_counters: Arc::new(Mutex::new(0)),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counters
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.txt",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn save<R: Announce + Records>(&self, path: &Path, result: &R) -> Result<(), std::io::Error> {
    let records = result.records(self.label_with_name);
    std::fs::write(path, records.join("\n"))?;
    std::fs::write(path.with_extension("say"), result.announcement())?;
    debug!("记录已保存: {:?}", path);
    Ok(())
  }
}

impl<R: Announce + Records> Render<R> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, result: &R) -> Result<(), Self::Error> {
    if self.always || result.has_records() {
      let path = self.frame_path()?;
      self.save(&path, result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decode::{BBox, DecodeError, DetectResult, Detection};

  fn files_with_ext(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn one_dog() -> DetectResult {
    DetectResult {
      input_size: 640,
      items: vec![Detection {
        label: "dog".to_string(),
        class_id: Some(16),
        confidence: 0.9,
        bbox: BBox {
          x: 10.0,
          y: 10.0,
          width: 290.0,
          height: 290.0,
        },
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn writes_records_and_announcement() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), true, false);
    output.render_result(&one_dog()).unwrap();

    let records = files_with_ext(dir.path(), "txt");
    assert_eq!(records.len(), 1);
    let text = std::fs::read_to_string(&records[0]).unwrap();
    assert_eq!(text, "dog, 0.9000, 10.00, 10.00, 290.00, 290.00");

    let said = std::fs::read_to_string(records[0].with_extension("say")).unwrap();
    assert_eq!(said, "I see a dog, which is Close");
  }

  #[test]
  fn empty_results_skipped_unless_always() {
    let failed: Result<DetectResult, DecodeError> = Err(DecodeError::OutputsUnresolved);

    let dir = tempfile::tempdir().unwrap();
    DirectoryRecordOutput::new(dir.path(), true, false)
      .render_result(&failed)
      .unwrap();
    assert!(files_with_ext(dir.path(), "say").is_empty());

    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    DirectoryRecordOutput::from_url(&url)
      .unwrap()
      .render_result(&failed)
      .unwrap();
    let said = files_with_ext(dir.path(), "say");
    assert_eq!(said.len(), 1);
    assert_eq!(
      std::fs::read_to_string(&said[0]).unwrap(),
      "Error: Model output format unknown."
    );
  }
}
