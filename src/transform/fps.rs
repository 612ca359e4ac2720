// 该文件是 Jingtou （镜头） 项目的一部分。
// src/transform/fps.rs - 帧率统计
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

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use ab_glyph::{FontArc, PxScale};
use image::Rgb;
use imageproc::drawing::draw_text_mut;
use thiserror::Error;
use tracing::debug;

use super::Transform;
use crate::frame::Frame;

const FPS_WINDOW: usize = 30;
const FPS_FONT_SIZE: f32 = 32.0;
const FPS_POSITION: (i32, i32) = (7, 40);
const FPS_COLOR: [u8; 3] = [100, 255, 0];

#[derive(Error, Debug)]
pub enum FpsMeterError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法加载字体: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 帧率统计
///
/// 取最近若干帧间隔的平均值。加载了字体时把结果画在帧上，否则只写日志。
pub struct FpsMeter {
  window: usize,
  intervals: VecDeque<Duration>,
  last: Option<Instant>,
  frames: u64,
  font: Option<FontArc>,
  scale: PxScale,
  position: (i32, i32),
  color: Rgb<u8>,
}

impl Default for FpsMeter {
  fn default() -> Self {
    Self::new()
  }
}

impl FpsMeter {
  pub fn new() -> Self {
    Self {
      window: FPS_WINDOW,
      intervals: VecDeque::with_capacity(FPS_WINDOW),
      last: None,
      frames: 0,
      font: None,
      scale: PxScale::from(FPS_FONT_SIZE),
      position: FPS_POSITION,
      color: Rgb(FPS_COLOR),
    }
  }

  pub fn with_window(mut self, window: usize) -> Self {
    self.window = window.max(1);
    self
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: &Path) -> Result<Self, FpsMeterError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(self.with_font(font))
  }

  pub fn with_position(mut self, x: i32, y: i32) -> Self {
    self.position = (x, y);
    self
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  /// 记录一帧到达的时间，返回当前平均帧率
  pub fn record(&mut self, now: Instant) -> Option<f64> {
    if let Some(last) = self.last.replace(now) {
      if self.intervals.len() == self.window {
        self.intervals.pop_front();
      }
      self.intervals.push_back(now.saturating_duration_since(last));
    }
    self.frames += 1;
    self.fps()
  }

  pub fn fps(&self) -> Option<f64> {
    let total: Duration = self.intervals.iter().sum();
    if self.intervals.is_empty() || total.is_zero() {
      return None;
    }
    Some(self.intervals.len() as f64 / total.as_secs_f64())
  }
}

impl Transform for FpsMeter {
  fn apply(&mut self, mut frame: Frame) -> anyhow::Result<Frame> {
    let Some(fps) = self.record(Instant::now()) else {
      return Ok(frame);
    };

    match &self.font {
      Some(font) => {
        let text = format!("FPS: {:.1}", fps);
        draw_text_mut(
          &mut frame.image,
          self.color,
          self.position.0,
          self.position.1,
          self.scale,
          font,
          &text,
        );
      }
      None if self.frames % self.window as u64 == 0 => {
        debug!("当前帧率: {:.1}", fps);
      }
      None => {}
    }

    Ok(frame)
  }
}
