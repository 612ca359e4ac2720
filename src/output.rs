// 该文件是 Jingtou （镜头） 项目的一部分。
// src/output.rs - 显示与输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::mpsc::{Receiver, TryRecvError};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::FromUrl;
#[cfg(any(
  feature = "directory_record",
  feature = "gstreamer_output",
  feature = "window_display"
))]
use crate::FromUrlWithScheme;
use crate::frame::Frame;

pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[cfg(feature = "window_display")]
mod window_display;
#[cfg(feature = "window_display")]
pub use self::window_display::{WindowDisplay, WindowDisplayError};

#[derive(Error, Debug)]
pub enum DisplayError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[cfg(feature = "window_display")]
  #[error("窗口显示错误: {0}")]
  WindowDisplayError(#[from] WindowDisplayError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 显示一帧之后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayAction {
  Continue,
  Quit,
}

/// 帧的最终去处
///
/// 每帧调用一次 `show`，同时轮询一次退出请求。
pub trait DisplaySink {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError>;
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    (**self).show(frame)
  }
}

/// 不显示画面，收到中断信号后请求退出
#[derive(Default)]
pub struct HeadlessDisplay {
  interrupt: Option<Receiver<()>>,
  shown: u64,
}

impl HeadlessDisplay {
  pub fn new() -> Self {
    Self::default()
  }

  /// 接收中断信号的通道，通常由 ctrlc 处理函数发送
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  pub fn frames_shown(&self) -> u64 {
    self.shown
  }
}

impl DisplaySink for HeadlessDisplay {
  fn show(&mut self, _frame: &Frame) -> Result<DisplayAction, DisplayError> {
    self.shown += 1;
    let Some(interrupt) = &self.interrupt else {
      return Ok(DisplayAction::Continue);
    };

    match interrupt.try_recv() {
      Ok(()) => {
        info!("收到中断信号，准备退出");
        Ok(DisplayAction::Quit)
      }
      Err(TryRecvError::Empty) => Ok(DisplayAction::Continue),
      Err(TryRecvError::Disconnected) => {
        warn!("中断信号通道已关闭");
        self.interrupt = None;
        Ok(DisplayAction::Continue)
      }
    }
  }
}

pub enum OutputWrapper {
  Headless(HeadlessDisplay),
  #[cfg(feature = "window_display")]
  Window(WindowDisplay),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideo(GStreamerVideoOutput),
}

impl FromUrl for OutputWrapper {
  type Error = DisplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "window_display")]
      WindowDisplay::SCHEME => Ok(OutputWrapper::Window(WindowDisplay::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => Ok(OutputWrapper::GStreamerVideo(
        GStreamerVideoOutput::from_url(url)?,
      )),
      scheme => Err(DisplayError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl DisplaySink for OutputWrapper {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    match self {
      OutputWrapper::Headless(output) => output.show(frame),
      #[cfg(feature = "window_display")]
      OutputWrapper::Window(output) => output.show(frame),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.show(frame),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideo(output) => output.show(frame),
    }
  }
}

/// 每帧送往所有输出，任一输出请求退出即退出
impl<S: DisplaySink> DisplaySink for Vec<S> {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    let mut action = DisplayAction::Continue;
    for output in self.iter_mut() {
      if output.show(frame)? == DisplayAction::Quit {
        action = DisplayAction::Quit;
      }
    }
    Ok(action)
  }
}
