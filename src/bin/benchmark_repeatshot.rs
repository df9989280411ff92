// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复解码测速
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::PipelineWrapper,
  session::DetectSession,
  task::{RepeatShotTask, Task},
};

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码管线
  #[arg(long, value_name = "PIPELINE", default_value = "yolo://")]
  pub pipeline: Url,
  /// 推理结果来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,
  /// 重复次数
  #[arg(long, value_name = "COUNT", default_value_t = 1000)]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("解码管线: {}", args.pipeline);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let input = InputWrapper::from_url(&args.input)?;
  let pipeline = PipelineWrapper::from_url(&args.pipeline)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let session = DetectSession::ready(pipeline);

  let task = RepeatShotTask::default().with_repeat(args.repeat);
  let mean = task.run_task(input.into_captures(), &session, output)?;
  info!("平均解码时间: {:.2?}", mean);

  Ok(())
}
