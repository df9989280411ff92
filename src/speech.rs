// 该文件是 Kanjian （看见） 项目的一部分。
// src/speech.rs - 播报文本
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

use crate::{
  classify::ClassifyResult,
  decode::{DecodeError, DetectResult},
  task::CaptureError,
};

pub const NOTHING_DETECTED: &str = "I don't see anything.";
pub const NOT_SURE: &str = "Not sure what that is.";
pub const FORMAT_UNKNOWN: &str = "Error: Model output format unknown.";
pub const DETECTION_FAILED: &str = "Error detecting object";

/// 生成交给语音播报的一句话
pub trait Announce {
  fn announcement(&self) -> String;
}

impl Announce for DetectResult {
  fn announcement(&self) -> String {
    match (self.primary(), self.proximity()) {
      (Some(primary), Some(proximity)) => {
        format!("I see a {}, which is {}", primary.label, proximity)
      }
      _ => NOTHING_DETECTED.to_string(),
    }
  }
}

impl Announce for ClassifyResult {
  fn announcement(&self) -> String {
    match self.top() {
      Some(top) => format!("{} ({:.1}%)", top.label, top.probability * 100.0),
      None => NOT_SURE.to_string(),
    }
  }
}

impl Announce for DecodeError {
  fn announcement(&self) -> String {
    FORMAT_UNKNOWN.to_string()
  }
}

impl Announce for CaptureError {
  fn announcement(&self) -> String {
    match self {
      CaptureError::Decode(err) => err.announcement(),
      CaptureError::Input(_) => DETECTION_FAILED.to_string(),
    }
  }
}

impl<T: Announce, E: Announce> Announce for Result<T, E> {
  fn announcement(&self) -> String {
    match self {
      Ok(result) => result.announcement(),
      Err(err) => err.announcement(),
    }
  }
}
