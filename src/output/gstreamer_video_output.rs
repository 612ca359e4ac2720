// 该文件是 Jingtou （镜头） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频文件输出模块
//!
//! 将处理后的帧编码保存为视频文件。
//!
//! ## URL Scheme
//!
//! `gst:///output.mp4?fps=30`
//!
//! 按扩展名选择封装：`.mp4`、`.mkv`、`.avi`、`.webm`，其他扩展名按 MP4 处理。
//! 画面尺寸取自第一帧，之后尺寸不能改变。

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{DisplayAction, DisplayError, DisplaySink},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 帧尺寸与第一帧不一致
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

const DEFAULT_FPS: i32 = 30;
const EOS_TIMEOUT_SECS: u64 = 5;

fn pipeline_description(file_path: &str) -> String {
  let encoder = if file_path.ends_with(".mkv") {
    "x264enc speed-preset=fast ! h264parse ! matroskamux"
  } else if file_path.ends_with(".avi") {
    "x264enc ! avimux"
  } else if file_path.ends_with(".webm") {
    return format!(
      "appsrc name=src ! videoconvert ! vp8enc ! webmmux ! filesink location=\"{}\"",
      file_path
    );
  } else {
    "x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
  };

  format!(
    "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! {} ! filesink location=\"{}\"",
    encoder, file_path
  )
}

/// GStreamer 视频文件输出
///
/// 管理 GStreamer 编码管道，drop 时发送 EOS 并等待文件写完。
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: i32,
  frame_count: u64,
  size: Option<(u32, u32)>,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    gst::init()?;

    let fps: i32 = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse().ok())
      .filter(|fps| *fps > 0)
      .unwrap_or(DEFAULT_FPS);

    let file_path = urlencoding::decode(url.path())
      .map_err(|e| GStreamerVideoOutputError::PipelineError(e.to_string()))?;
    let pipeline_desc = pipeline_description(&file_path);

    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    info!("Video output initialized: {} fps -> {}", fps, file_path);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      fps,
      frame_count: 0,
      size: None,
    })
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if self.size.is_some() {
      if let Err(e) = self.appsrc.end_of_stream() {
        warn!("Failed to send EOS to video output: {:?}", e);
      }

      // 等待 EOS 传到 filesink，文件才完整
      if let Some(bus) = self.pipeline.bus() {
        bus.timed_pop_filtered(
          gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
          &[gst::MessageType::Eos, gst::MessageType::Error],
        );
      }
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }

    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
  }
}

impl GStreamerVideoOutput {
  /// 第一帧到达时按其尺寸设置 caps 并启动管道
  fn ensure_started(&mut self, width: u32, height: u32) -> Result<(), GStreamerVideoOutputError> {
    match self.size {
      Some(expected) if expected == (width, height) => Ok(()),
      Some(expected) => Err(GStreamerVideoOutputError::FrameSizeChanged {
        expected,
        actual: (width, height),
      }),
      None => {
        let caps = gst::Caps::builder("video/x-raw")
          .field("format", "RGB")
          .field("width", width as i32)
          .field("height", height as i32)
          .field("framerate", gst::Fraction::new(self.fps, 1))
          .build();
        self.appsrc.set_caps(Some(&caps));
        self.pipeline.set_state(gst::State::Playing)?;
        self.size = Some((width, height));
        info!("Video output started: {}x{} @ {} fps", width, height, self.fps);
        Ok(())
      }
    }
  }

  pub fn push_frame(&mut self, frame: &Frame) -> Result<(), GStreamerVideoOutputError> {
    self.ensure_started(frame.width(), frame.height())?;

    let data = frame.image.as_raw();
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    let frame_duration = 1_000_000_000 / self.fps as u64;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * frame_duration,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));

      let mut buffer_map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      buffer_map.copy_from_slice(data);
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }
}

impl DisplaySink for GStreamerVideoOutput {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    self.push_frame(frame)?;
    Ok(DisplayAction::Continue)
  }
}
