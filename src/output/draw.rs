// 该文件是 Jingtou （镜头） 项目的一部分。
// src/output/draw.rs - 检测结果绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;

// 每字符平均宽度（粗略估计），相对字号
const LABEL_CHAR_WIDTH_RATIO: f32 = 0.55;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

/// 在图像上画一个人脸框
///
/// 框会先被裁剪到图像范围内，`thickness` 层边框由外向内绘制。
pub fn draw_box(image: &mut RgbImage, detection: &Detection, color: Rgb<u8>, thickness: u32) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  if w == 0 || h == 0 {
    return;
  }

  let left = detection.left.clamp(0, w - 1);
  let top = detection.top.clamp(0, h - 1);
  let right = detection.right.clamp(0, w - 1);
  let bottom = detection.bottom.clamp(0, h - 1);

  for t in 0..thickness as i32 {
    let (x_min, y_min, x_max, y_max) = (left + t, top + t, right - t, bottom - t);
    if x_min > x_max || y_min > y_max {
      break;
    }
    let rect = Rect::at(x_min, y_min).of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}

/// 在 (x, y) 上方画一个带底色的文字标签
pub fn draw_label(
  image: &mut RgbImage,
  x: i32,
  y: i32,
  text: &str,
  font: &FontArc,
  font_size: f32,
  background: Rgb<u8>,
) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  let text_height = font_size.ceil() as i32 + 4;
  let text_width = (text.chars().count() as f32 * font_size * LABEL_CHAR_WIDTH_RATIO) as i32;

  let label_x = x.clamp(0, (w - 1).max(0));
  let label_y = (y - text_height).clamp(0, (h - 1).max(0));
  let label_width = text_width.min(w - label_x);
  let label_height = text_height.min(h - label_y);

  // 仅在标签有空间时绘制
  if label_width <= 0 || label_height <= 0 {
    return;
  }

  let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
  draw_filled_rect_mut(image, rect, background);
  draw_text_mut(
    image,
    Rgb(LABEL_TEXT_COLOR),
    label_x,
    label_y + 2,
    PxScale::from(font_size),
    font,
    text,
  );
}
