// 该文件是 Jingtou （镜头） 项目的一部分。
// src/detect.rs - 人脸检测
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

use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  output::draw::{draw_box, draw_label},
  transform::Transform,
};

#[cfg(feature = "model_rknn")]
mod rknn_face;
#[cfg(feature = "model_rknn")]
pub use self::rknn_face::{RknnFaceError, RknnFaceLocator};

#[derive(Error, Debug)]
pub enum DetectError {
  #[cfg(feature = "model_rknn")]
  #[error("RKNN 人脸模型错误: {0}")]
  RknnError(#[from] RknnFaceError),
  #[error("检测后端错误: {0}")]
  BackendError(String),
}

/// 一个人脸框，像素坐标 (top, left, bottom, right) 加置信度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub top: i32,
  pub left: i32,
  pub bottom: i32,
  pub right: i32,
  pub confidence: f32,
}

impl Detection {
  pub fn new(top: i32, left: i32, bottom: i32, right: i32, confidence: f32) -> Self {
    Self {
      top,
      left,
      bottom,
      right,
      confidence,
    }
  }

  /// 由 [x_min, y_min, x_max, y_max] 浮点坐标构造
  pub fn from_xyxy(bbox: [f32; 4], confidence: f32) -> Self {
    Self {
      top: bbox[1].floor() as i32,
      left: bbox[0].floor() as i32,
      bottom: bbox[3].ceil() as i32,
      right: bbox[2].ceil() as i32,
      confidence,
    }
  }

  /// 由左上角加宽高构造
  pub fn from_xywh(x: i32, y: i32, width: i32, height: i32, confidence: f32) -> Self {
    Self::new(y, x, y + height, x + width, confidence)
  }

  pub fn width(&self) -> i32 {
    (self.right - self.left).max(0)
  }

  pub fn height(&self) -> i32 {
    (self.bottom - self.top).max(0)
  }

  pub fn area(&self) -> i64 {
    self.width() as i64 * self.height() as i64
  }

  /// 计算两个框的 IoU
  pub fn iou(&self, other: &Detection) -> f32 {
    let top = self.top.max(other.top);
    let left = self.left.max(other.left);
    let bottom = self.bottom.min(other.bottom);
    let right = self.right.min(other.right);

    let intersection = (right - left).max(0) as i64 * (bottom - top).max(0) as i64;
    let union = self.area() + other.area() - intersection;

    if union > 0 {
      intersection as f32 / union as f32
    } else {
      0.0
    }
  }
}

/// 非极大值抑制，结果按置信度降序
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut result: Vec<Detection> = Vec::with_capacity(detections.len());
  for det in detections {
    if result.iter().all(|kept| kept.iou(&det) < iou_threshold) {
      result.push(det);
    }
  }
  result
}

/// 外部人脸定位模型
pub trait FaceLocator {
  fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectError>;
}

impl<L: FaceLocator + ?Sized> FaceLocator for Box<L> {
  fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectError> {
    (**self).locate(image)
  }
}

/// 调用模式：画框或返回坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
  Annotate,
  Extract,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutput {
  Frame(Frame),
  Detections(Vec<Detection>),
}

const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_COLOR: [u8; 3] = [255, 255, 255];
const DEFAULT_THICKNESS: u32 = 2;
const LABEL_FONT_SIZE: f32 = 20.0;

/// 把人脸定位模型包装成帧处理步骤
///
/// 作为处理步骤时在帧上原地画框；`call` 的 `Extract` 模式改为返回人脸框列表，
/// 供注册流程裁剪人脸使用。置信度低于 `min_confidence` 的结果会被丢弃。
pub struct FaceDetection<L> {
  locator: L,
  pub min_confidence: f32,
  pub draw_detections: bool,
  pub color: Rgb<u8>,
  pub thickness: u32,
  font: Option<FontArc>,
}

impl<L: FaceLocator> FaceDetection<L> {
  pub fn new(locator: L) -> Self {
    Self {
      locator,
      min_confidence: DEFAULT_MIN_CONFIDENCE,
      draw_detections: true,
      color: Rgb(DEFAULT_COLOR),
      thickness: DEFAULT_THICKNESS,
      font: None,
    }
  }

  pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
    self.min_confidence = min_confidence;
    self
  }

  pub fn with_draw_detections(mut self, draw: bool) -> Self {
    self.draw_detections = draw;
    self
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness;
    self
  }

  /// 设置字体后在框上方标注置信度
  pub fn with_label_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn locator_mut(&mut self) -> &mut L {
    &mut self.locator
  }

  /// 对一帧调用一次定位模型
  pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
    let mut detections = self.locator.locate(&frame.image)?;
    let reported = detections.len();
    detections.retain(|det| det.confidence >= self.min_confidence);
    debug!(
      "第 {} 帧检测到 {} 张人脸（过滤前 {}）",
      frame.index,
      detections.len(),
      reported
    );
    Ok(detections)
  }

  /// 检测并在帧上画框，返回同一帧
  pub fn annotate(&mut self, mut frame: Frame) -> Result<Frame, DetectError> {
    let detections = self.detect(&frame)?;
    if self.draw_detections {
      self.draw(&mut frame.image, &detections);
    }
    Ok(frame)
  }

  pub fn call(&mut self, frame: Frame, mode: DetectionMode) -> Result<DetectionOutput, DetectError> {
    match mode {
      DetectionMode::Annotate => self.annotate(frame).map(DetectionOutput::Frame),
      DetectionMode::Extract => self.detect(&frame).map(DetectionOutput::Detections),
    }
  }

  fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
      draw_box(image, det, self.color, self.thickness);
      if let Some(font) = &self.font {
        let text = format!("{:.2}", det.confidence);
        draw_label(image, det.left, det.top, &text, font, LABEL_FONT_SIZE, self.color);
      }
    }
  }
}

impl<L: FaceLocator> Transform for FaceDetection<L> {
  fn apply(&mut self, frame: Frame) -> anyhow::Result<Frame> {
    Ok(self.annotate(frame)?)
  }
}
