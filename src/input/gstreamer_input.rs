// 该文件是 Jingtou （镜头） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 本模块提供基于 GStreamer 的解码后端，支持：
//! - 视频文件读取（`filesrc ! decodebin`）
//! - 摄像头捕获（`v4l2src`）
//! - RTSP / HTTP 网络流（`uridecodebin`）
//!
//! ## 系统依赖
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use jingtou::input::{FrameReader, GStreamerInputPipelineBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut input = GStreamerInputPipelineBuilder::new()
//!     .file(std::path::Path::new("video.mp4"))
//!     .build()?;
//!
//! while let Some(image) = input.read()? {
//!     println!("处理帧: {}x{}", image.width(), image.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 支持的视频格式
//!
//! appsink 协商为 RGB；若上游只给出 BGR，则在这里转换为 RGB。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  frame::{ColorOrder, packed_to_rgb},
  input::{FrameReader, InputError},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 未指定输入
  #[error("No source element in pipeline")]
  NoSource,
}

const OPEN_TIMEOUT_SECS: u64 = 10;
const PULL_TIMEOUT_MS: u64 = 500;
const CAMERA_WIDTH: u32 = 640;
const CAMERA_HEIGHT: u32 = 480;
const CAMERA_FPS: u32 = 30;

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  UriSource(String),
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => {
        format!(
          "v4l2src device={} ! videoconvert ! video/x-raw,width={},height={},framerate={}/1",
          camera, width, height, fps
        )
      }
      GStreamerInputBuilderItem::UriSource(uri) => {
        format!("uridecodebin uri=\"{}\"", uri)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use jingtou::input::GStreamerInputPipelineBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let input = GStreamerInputPipelineBuilder::new()
///     .camera(std::path::Path::new("/dev/video0"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn file(mut self, path: &Path) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.display().to_string()));
    self.live = false;
    self
  }

  pub fn camera(mut self, device: &Path) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: device.display().to_string(),
      width: CAMERA_WIDTH,
      height: CAMERA_HEIGHT,
      fps: CAMERA_FPS,
    });
    self.live = true;
    self
  }

  pub fn uri(mut self, url: &Url) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::UriSource(url.to_string()));
    self.live = true;
    self
  }

  pub fn build(mut self) -> Result<GStreamerInput, GStreamerInputError> {
    if self.items.is_empty() {
      return Err(GStreamerInputError::NoSource);
    }

    gst::init()?;

    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 文件输入不能丢帧，否则帧索引会错位
    let full_pipeline = if self.live {
      format!("{} ! appsink max-buffers=2 drop=true name=sink", basic_pipeline)
    } else {
      format!(
        "{} ! appsink max-buffers=4 drop=false sync=false name=sink",
        basic_pipeline
      )
    };

    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    // 等待管道就绪，打不开的源在这里失败
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
    if let Err(e) = result {
      let reason = pop_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
      if let Err(e) = pipeline.set_state(gst::State::Null) {
        warn!("Failed to stop GStreamer pipeline: {}", e);
      }
      return Err(GStreamerInputError::PipelineError(reason));
    }

    let fps = negotiated_fps(&appsink);
    debug!("GStreamer 输入帧率: {:?}", fps);

    Ok(GStreamerInput {
      pipeline,
      appsink,
      fps,
    })
  }
}

/// GStreamer 解码后端
///
/// 管理 GStreamer 管道和 appsink，drop 时把管道置为 Null 释放设备。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  fps: Option<f64>,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl FrameReader for GStreamerInput {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    match self
      .appsink
      .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
    {
      Some(sample) => Ok(Some(convert_sample_to_rgb(&sample)?)),
      None if self.appsink.is_eos() => Ok(None),
      None => {
        if let Some(reason) = pop_bus_error(&self.pipeline) {
          error!("GStreamer 管道错误: {}", reason);
          return Err(GStreamerInputError::PipelineError(reason).into());
        }
        Err(InputError::EmptyRead)
      }
    }
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }
}

fn pop_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
  let message = pipeline
    .bus()?
    .pop_filtered(&[gst::MessageType::Error])?;
  match message.view() {
    gst::MessageView::Error(err) => Some(err.error().to_string()),
    _ => None,
  }
}

fn negotiated_fps(appsink: &gst_app::AppSink) -> Option<f64> {
  let caps = appsink.static_pad("sink")?.current_caps()?;
  let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
  let fps = info.fps();
  if fps.numer() > 0 && fps.denom() > 0 {
    Some(fps.numer() as f64 / fps.denom() as f64)
  } else {
    None
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;

  let order = match video_info.format() {
    gst_video::VideoFormat::Rgb => ColorOrder::Rgb,
    gst_video::VideoFormat::Bgr => ColorOrder::Bgr,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  packed_to_rgb(data, width, height, stride, order).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: stride * height as usize,
      actual: data.len(),
    },
  )
}
