// 该文件是 Jingtou （镜头） 项目的一部分。
// src/output/window_display.rs - 窗口显示
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{DisplayAction, DisplayError, DisplaySink},
};

#[derive(Error, Debug)]
pub enum WindowDisplayError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("窗口错误: {0}")]
  WindowError(#[from] minifb::Error),
}

const DEFAULT_TITLE: &str = "jingtou";
const QUIT_KEY: Key = Key::Q;

/// 桌面窗口
///
/// 帧尺寸变化时重建窗口。按 `q` 或关闭窗口时请求退出。
pub struct WindowDisplay {
  title: String,
  window: Option<Window>,
  size: (usize, usize),
  buffer: Vec<u32>,
}

impl FromUrlWithScheme for WindowDisplay {
  const SCHEME: &'static str = "window";
}

impl FromUrl for WindowDisplay {
  type Error = WindowDisplayError;

  /// `window://?title=xxx`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(WindowDisplayError::SchemeMismatch);
    }

    let title = url
      .query_pairs()
      .find(|(k, _)| k == "title")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    Ok(Self::new(&title))
  }
}

impl WindowDisplay {
  /// 窗口在第一帧到达时才创建
  pub fn new(title: &str) -> Self {
    Self {
      title: title.to_string(),
      window: None,
      size: (0, 0),
      buffer: Vec::new(),
    }
  }

  fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window, WindowDisplayError> {
    if self.size != (width, height) {
      self.window = None;
    }

    let window = match self.window.take() {
      Some(window) => window,
      None => {
        info!("创建窗口 {}: {}x{}", self.title, width, height);
        self.size = (width, height);
        Window::new(&self.title, width, height, WindowOptions::default())?
      }
    };
    Ok(self.window.insert(window))
  }
}

/// RGB 像素打包为 minifb 使用的 0RGB
fn pack_0rgb(image: &RgbImage, buffer: &mut Vec<u32>) {
  buffer.clear();
  buffer.extend(
    image
      .pixels()
      .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
  );
}

impl DisplaySink for WindowDisplay {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let mut buffer = std::mem::take(&mut self.buffer);
    pack_0rgb(&frame.image, &mut buffer);

    let window = self.window_for(width, height)?;
    let updated = window.update_with_buffer(&buffer, width, height);
    let action = if !window.is_open() || window.is_key_down(QUIT_KEY) {
      debug!("窗口请求退出");
      DisplayAction::Quit
    } else {
      DisplayAction::Continue
    };

    self.buffer = buffer;
    updated.map_err(WindowDisplayError::from)?;
    Ok(action)
  }
}
