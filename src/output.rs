// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  classify::ClassifyResult,
  decode::DetectResult,
  pipeline::Outcome,
  speech::Announce,
};

pub trait Render<Output>: Sized {
  type Error;
  fn render_result(&self, result: &Output) -> Result<(), Self::Error>;
}

/// 结果的文本记录，每个检测一行
pub trait Records {
  fn records(&self, with_name: bool) -> Vec<String>;

  fn has_records(&self) -> bool {
    !self.records(false).is_empty()
  }
}

impl Records for DetectResult {
  fn records(&self, with_name: bool) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        let name = match (with_name, item.class_id) {
          (true, _) | (false, None) => item.label.clone(),
          (false, Some(id)) => id.to_string(),
        };
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          name, item.confidence, item.bbox.x, item.bbox.y, item.bbox.width, item.bbox.height
        )
      })
      .collect()
  }

  fn has_records(&self) -> bool {
    !self.is_empty()
  }
}

impl Records for ClassifyResult {
  fn records(&self, with_name: bool) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        let name = if with_name {
          item.label.clone()
        } else {
          item.class_id.to_string()
        };
        format!("{}, {:.4}", name, item.probability)
      })
      .collect()
  }

  fn has_records(&self) -> bool {
    !self.is_empty()
  }
}

impl Records for Outcome {
  fn records(&self, with_name: bool) -> Vec<String> {
    match self {
      Outcome::Detected(result) => result.records(with_name),
      Outcome::Classified(result) => result.records(with_name),
    }
  }
}

impl<T: Records, E> Records for Result<T, E> {
  fn records(&self, with_name: bool) -> Vec<String> {
    match self {
      Ok(result) => result.records(with_name),
      Err(_) => Vec::new(),
    }
  }
}

mod console;
pub use self::console::{ConsoleOutput, ConsoleOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("控制台输出错误: {0}")]
  ConsoleOutputError(#[from] ConsoleOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => {
        let output = ConsoleOutput::from_url(url)?;
        Ok(OutputWrapper::Console(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<R: Announce + Records> Render<R> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, result: &R) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.render_result(result).map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.render_result(result).map_err(OutputError::from)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decode::{BBox, DecodeError, Detection};

  fn result() -> DetectResult {
    DetectResult {
      input_size: 640,
      items: vec![
        Detection {
          label: "cat".to_string(),
          class_id: Some(15),
          confidence: 0.87654,
          bbox: BBox {
            x: 64.0,
            y: 32.0,
            width: 256.0,
            height: 128.5,
          },
        },
        Detection {
          label: "unknown".to_string(),
          class_id: None,
          confidence: 0.5,
          bbox: BBox {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
          },
        },
      ]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn detection_records_by_name_and_id() {
    let r = result();
    assert_eq!(
      r.records(true)[0],
      "cat, 0.8765, 64.00, 32.00, 256.00, 128.50"
    );
    assert_eq!(r.records(false)[0], "15, 0.8765, 64.00, 32.00, 256.00, 128.50");
    assert!(r.records(false)[1].starts_with("unknown, "));
  }

  #[test]
  fn failed_decode_has_no_records() {
    let failed: Result<DetectResult, DecodeError> = Err(DecodeError::OutputsUnresolved);
    assert!(failed.records(true).is_empty());
    assert!(!failed.has_records());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}
