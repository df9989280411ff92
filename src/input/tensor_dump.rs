// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/tensor_dump.rs - 推理结果转储输入
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

use std::{
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{InferenceDump, RawInferenceResult},
};

#[derive(Error, Debug)]
pub enum TensorDumpError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("转储文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("目录中没有转储文件: {0:?}")]
  Empty(PathBuf),
}

/// 从 JSON 转储中回放推理结果，每个文件对应一次拍摄
pub struct TensorDumpInput {
  files: Vec<PathBuf>,
}

impl FromUrlWithScheme for TensorDumpInput {
  const SCHEME: &'static str = "dump";
}

impl FromUrl for TensorDumpInput {
  type Error = TensorDumpError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorDumpError::SchemeMismatch);
    }

    Self::open(url.path())
  }
}

impl TensorDumpInput {
  /// 打开单个文件，或目录下按文件名排序的全部 `*.json`
  pub fn open(path: impl AsRef<Path>) -> Result<Self, TensorDumpError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
      let mut files = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.extension().is_some_and(|ext| ext == "json") {
          files.push(entry_path);
        }
      }
      files.sort();
      if files.is_empty() {
        return Err(TensorDumpError::Empty(path.to_path_buf()));
      }
      files
    } else {
      // 提前确认文件可读
      File::open(path)?;
      vec![path.to_path_buf()]
    };

    info!("转储输入: {} 个文件", files.len());
    Ok(Self { files })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn into_captures(self) -> TensorDumpCaptures {
    TensorDumpCaptures {
      files: self.files.into_iter(),
    }
  }
}

pub fn read_dump(path: &Path) -> Result<RawInferenceResult, TensorDumpError> {
  let reader = BufReader::new(File::open(path)?);
  let dump: InferenceDump = serde_json::from_reader(reader)?;
  Ok(dump.into())
}

/// 每个文件产出一次拍摄，读取失败的文件产出对应的错误
pub struct TensorDumpCaptures {
  files: std::vec::IntoIter<PathBuf>,
}

impl Iterator for TensorDumpCaptures {
  type Item = Result<RawInferenceResult, TensorDumpError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    debug!("读取转储文件: {:?}", path);
    let result = read_dump(&path);
    if let Err(e) = &result {
      error!("读取转储文件 {:?} 失败: {}", path, e);
    }
    Some(result)
  }
}
