// 该文件是 Kanjian （看见） 项目的一部分。
// src/session.rs - 检测会话
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

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  decode::DecodeError,
  pipeline::Pipeline,
  tensor::RawInferenceResult,
};

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
  #[error("模型尚未就绪")]
  NotReady,
  #[error("上一次检测尚未完成")]
  Busy,
}

/// 持有管线与就绪/忙碌状态的检测上下文
///
/// 同一时间只允许一次检测；重叠的请求直接拒绝，不排队。
pub struct DetectSession<P> {
  pipeline: P,
  ready: AtomicBool,
  busy: AtomicBool,
}

/// 检测进行中的凭据，释放时清除忙碌标记
pub struct CaptureGuard<'s, P> {
  session: &'s DetectSession<P>,
}

impl<P> DetectSession<P> {
  /// 新会话默认未就绪，模型加载完成后调用 [`DetectSession::mark_ready`]
  pub fn new(pipeline: P) -> Self {
    Self {
      pipeline,
      ready: AtomicBool::new(false),
      busy: AtomicBool::new(false),
    }
  }

  pub fn ready(pipeline: P) -> Self {
    let session = Self::new(pipeline);
    session.mark_ready();
    session
  }

  pub fn mark_ready(&self) {
    self.ready.store(true, Ordering::Release);
  }

  pub fn is_ready(&self) -> bool {
    self.ready.load(Ordering::Acquire)
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub fn pipeline(&self) -> &P {
    &self.pipeline
  }

  pub fn begin(&self) -> Result<CaptureGuard<'_, P>, SessionError> {
    if !self.is_ready() {
      warn!("模型尚未就绪，拒绝检测请求");
      return Err(SessionError::NotReady);
    }
    if self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      warn!("上一次检测尚未完成，拒绝新的请求");
      return Err(SessionError::Busy);
    }
    debug!("开始检测");
    Ok(CaptureGuard { session: self })
  }
}

impl<P: Pipeline> CaptureGuard<'_, P> {
  pub fn decode(&self, result: RawInferenceResult) -> Result<P::Output, DecodeError> {
    self.session.pipeline.decode(result)
  }
}

impl<P> Drop for CaptureGuard<'_, P> {
  fn drop(&mut self) {
    self.session.busy.store(false, Ordering::Release);
    debug!("检测结束");
  }
}
