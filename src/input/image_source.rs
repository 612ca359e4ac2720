// 该文件是 Jingtou （镜头） 项目的一部分。
// src/input/image_source.rs - 图片输入源
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use tracing::debug;
use url::Url;

use super::{InputError, decode_path};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 图片输入源
///
/// 只产生一帧，之后无论调用多少次都返回 `None`。
pub struct ImageSource {
  /// 图片数据
  image: RgbImage,
  /// 是否已读取
  consumed: bool,
}

impl FromUrlWithScheme for ImageSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(&decode_path(url)?)
  }
}

impl ImageSource {
  /// 打开并解码图片文件
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let image = ImageReader::open(path)
      .map_err(|e| InputError::unavailable(path.display(), e))?
      .with_guessed_format()
      .map_err(|e| InputError::unavailable(path.display(), e))?
      .decode()
      .map_err(|e| InputError::unavailable(path.display(), e))?
      .to_rgb8();

    debug!(
      "图片已解码: {}x{} {}",
      image.width(),
      image.height(),
      path.display()
    );

    Ok(Self::from_image(image))
  }

  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image,
      consumed: false,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn next_frame(&mut self) -> Option<Frame> {
    if self.consumed {
      return None;
    }

    self.consumed = true;
    Some(Frame::new(self.image.clone(), 0, 0))
  }
}
