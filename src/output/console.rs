// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/console.rs - 控制台输出
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

use std::io::Write;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Records, Render},
  speech::Announce,
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把记录打印到标准输出，播报文本写入日志
pub struct ConsoleOutput {
  label_with_name: bool,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }

    let label_with_name = !url.query_pairs().any(|(k, v)| k == "record" && v == "id");
    Ok(ConsoleOutput { label_with_name })
  }
}

impl<R: Announce + Records> Render<R> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, result: &R) -> Result<(), Self::Error> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in result.records(self.label_with_name) {
      writeln!(out, "  - {}", line)?;
    }
    out.flush()?;

    info!("播报: {}", result.announcement());
    Ok(())
  }
}
