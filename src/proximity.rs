// 该文件是 Kanjian （看见） 项目的一部分。
// src/proximity.rs - 距离估计
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

use std::fmt;

use serde::Serialize;

const VERY_CLOSE_RATIO: f32 = 0.6;
const CLOSE_RATIO: f32 = 0.3;

/// 由框宽占输入宽度的比例粗略估计的距离
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Proximity {
  VeryClose,
  Close,
  Far,
}

impl Proximity {
  pub fn from_width(width: f32, input_size: u32) -> Self {
    let ratio = width / input_size as f32;
    if ratio > VERY_CLOSE_RATIO {
      Proximity::VeryClose
    } else if ratio > CLOSE_RATIO {
      Proximity::Close
    } else {
      Proximity::Far
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Proximity::VeryClose => "Very Close",
      Proximity::Close => "Close",
      Proximity::Far => "Far",
    }
  }
}

impl fmt::Display for Proximity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
