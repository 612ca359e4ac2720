// 该文件是 Jingtou （镜头） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 帧数据
///
/// 像素始终为 RGB 顺序，行优先存储。BGR、YUYV 等格式只允许出现在输入后端内部，
/// 在构造 `Frame` 之前必须完成转换。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引（裁剪之前在输入源中的位置）
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// (高, 宽, 通道)
  pub fn shape(&self) -> (usize, usize, usize) {
    (
      self.image.height() as usize,
      self.image.width() as usize,
      RGB_CHANNELS,
    )
  }
}

/// 颜色顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
  Rgb,
  Bgr,
}

/// 把带步长的打包像素行复制为紧凑的 RGB 图像
///
/// `stride` 为每行字节数，必须不小于 `width * 3`。数据不足时返回 `None`。
pub fn packed_to_rgb(
  data: &[u8],
  width: u32,
  height: u32,
  stride: usize,
  order: ColorOrder,
) -> Option<RgbImage> {
  let row_bytes = width as usize * RGB_CHANNELS;
  if stride < row_bytes {
    return None;
  }

  let mut pixels = Vec::with_capacity(row_bytes * height as usize);
  for y in 0..height as usize {
    let row_start = y * stride;
    let row = data.get(row_start..row_start + row_bytes)?;
    match order {
      ColorOrder::Rgb => pixels.extend_from_slice(row),
      ColorOrder::Bgr => {
        for px in row.chunks_exact(RGB_CHANNELS) {
          pixels.extend_from_slice(&[px[2], px[1], px[0]]);
        }
      }
    }
  }

  RgbImage::from_raw(width, height, pixels)
}

/// 将 YUYV (YUV 4:2:2) 转换为 RGB
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Option<RgbImage> {
  let mut rgb = Vec::with_capacity((width * height) as usize * RGB_CHANNELS);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb.truncate((width * height) as usize * RGB_CHANNELS);
  RgbImage::from_raw(width, height, rgb)
}
