// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 检测任务
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

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  decode::DecodeError,
  output::Render,
  pipeline::Pipeline,
  session::DetectSession,
  speech::Announce,
  tensor::RawInferenceResult,
};

pub trait Task<I, P, O>: Sized {
  type Error;
  type Summary;
  fn run_task(
    self,
    input: I,
    session: &DetectSession<P>,
    output: O,
  ) -> Result<Self::Summary, Self::Error>;
}

/// 一次任务的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskSummary {
  pub captures: usize,
  pub failures: usize,
}

/// 单次拍摄的失败原因
#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("获取推理结果失败: {0}")]
  Input(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 对输入中的每次拍摄各解码一次
pub struct OneShotTask;

impl<I, IE, P, O, RE> Task<I, P, O> for OneShotTask
where
  I: Iterator<Item = Result<RawInferenceResult, IE>>,
  IE: std::error::Error + Sync + Send + 'static,
  P: Pipeline,
  Result<P::Output, CaptureError>: Announce,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<Result<P::Output, CaptureError>, Error = RE>,
{
  type Error = anyhow::Error;
  type Summary = TaskSummary;

  fn run_task(
    self,
    input: I,
    session: &DetectSession<P>,
    output: O,
  ) -> Result<Self::Summary, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();

    for (index, capture) in input.enumerate() {
      let guard = session.begin()?;
      info!("处理第 {} 次拍摄", index + 1);
      let decoded = match capture {
        Ok(result) => {
          let now = Instant::now();
          let decoded = guard.decode(result);
          info!("解码耗时: {:.2?}", now.elapsed());
          decoded.map_err(CaptureError::from)
        }
        Err(e) => Err(CaptureError::Input(Box::new(e))),
      };
      drop(guard);

      summary.captures += 1;
      if let Err(e) = &decoded {
        summary.failures += 1;
        warn!("第 {} 次拍摄失败: {}", index + 1, e);
      }
      info!("{}", decoded.announcement());
      output.render_result(&decoded)?;
    }

    if summary.captures == 0 {
      anyhow::bail!("没有输入");
    }

    info!(
      "任务完成: {} 次拍摄, {} 次失败",
      summary.captures, summary.failures
    );
    Ok(summary)
  }
}

/// 对第一次拍摄的结果重复解码，用于测量解码耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

/// 平均耗时，前两次视为预热不计入
pub fn mean_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = if times.len() > 2 { &times[2..] } else { times };
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<I, IE, P, O, RE> Task<I, P, O> for RepeatShotTask
where
  I: Iterator<Item = Result<RawInferenceResult, IE>>,
  IE: std::error::Error + Sync + Send + 'static,
  P: Pipeline,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<Result<P::Output, DecodeError>, Error = RE>,
{
  type Error = anyhow::Error;
  type Summary = Duration;

  fn run_task(
    self,
    mut input: I,
    session: &DetectSession<P>,
    output: O,
  ) -> Result<Self::Summary, Self::Error> {
    info!("开始任务...");
    let result = input.next().ok_or_else(|| anyhow::anyhow!("没有输入"))??;
    info!("输入获取成功，开始解码...");

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let guard = session.begin()?;
      let capture = result.clone();
      let now = Instant::now();
      let decoded = guard.decode(capture);
      let elapsed = now.elapsed();
      info!("({})解码完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(decoded);
    }

    if let Some(decoded) = last {
      output.render_result(&decoded)?;
    }

    let mean = mean_after_warmup(&times).unwrap_or_default();
    warn!("平均解码时间: {:.2?}", mean);
    Ok(mean)
  }
}
