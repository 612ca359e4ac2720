// 该文件是 Jingtou （镜头） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::ErrorKind;
use std::path::Path;
use std::pin::Pin;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  frame::yuyv_to_rgb,
  input::{FrameReader, InputError},
};

#[derive(Error, Debug)]
pub enum V4l2InputError {
  #[error("无法打开设备: {0}")]
  DeviceError(std::io::Error),
  #[error("无法设置视频格式: {0}")]
  FormatError(std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("无法创建捕获流: {0}")]
  StreamError(std::io::Error),
  #[error("无法捕获帧: {0}")]
  CaptureError(std::io::Error),
}

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

/// V4L2 摄像头解码后端
///
/// v4l 的 Stream 需要引用 Device，这里用 Pin<Box<Device>> 保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Input {
  /// 捕获流（生命周期与 device 关联，必须先于 device 释放）
  stream: Option<Stream<'static>>,
  /// V4L2 设备
  _device: Pin<Box<Device>>,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
}

impl V4l2Input {
  /// 打开设备并协商 YUYV 格式
  pub fn open(device_path: &Path) -> Result<Self, V4l2InputError> {
    let device = Box::pin(Device::with_path(device_path).map_err(V4l2InputError::DeviceError)?);

    let mut format = device.format().map_err(V4l2InputError::FormatError)?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(V4l2InputError::FormatError)?;

    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4l2InputError::UnsupportedPixelFormat(
        format.fourcc.to_string(),
      ));
    }

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 存储在同一个结构体中，Drop 时先于 device 释放。
    let device_ref: &Device = &device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)
        .map_err(V4l2InputError::StreamError)?
    };

    info!(
      "V4L2 设备已打开: {} {}x{}",
      device_path.display(),
      format.width,
      format.height
    );

    Ok(Self {
      stream: Some(stream),
      _device: device,
      width: format.width,
      height: format.height,
    })
  }
}

impl Drop for V4l2Input {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
    debug!("V4L2 设备已释放");
  }
}

impl FrameReader for V4l2Input {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    let Some(stream) = self.stream.as_mut() else {
      return Ok(None);
    };

    match stream.next() {
      Ok((buffer, meta)) => {
        let used = (meta.bytesused as usize).min(buffer.len());
        if used == 0 {
          return Err(InputError::EmptyRead);
        }
        // 不完整的帧按空读处理
        yuyv_to_rgb(&buffer[..used], self.width, self.height)
          .map(Some)
          .ok_or(InputError::EmptyRead)
      }
      Err(e)
        if matches!(
          e.kind(),
          ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
        ) =>
      {
        Err(InputError::EmptyRead)
      }
      Err(e) => Err(V4l2InputError::CaptureError(e).into()),
    }
  }
}
