// 该文件是 Jingtou （镜头） 项目的一部分。
// src/detect/rknn_face.rs - RKNN 人脸定位模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{RgbImage, imageops};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::{DetectError, Detection, FaceLocator, non_max_suppression},
};

const FACE_NUM_INPUTS: u32 = 1;
const FACE_NUM_OUTPUTS: u32 = 6;
const FACE_INPUT_W: u32 = 640;
const FACE_INPUT_H: u32 = 640;
const FACE_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const FACE_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const DEFAULT_SCORE_THRESH: f32 = 0.25;
const DEFAULT_NMS_THRESH: f32 = 0.45;

#[derive(Error, Debug)]
pub enum RknnFaceError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<rknpu::Error> for RknnFaceError {
  fn from(err: rknpu::Error) -> Self {
    RknnFaceError::RknnError(err)
  }
}

impl RknnFaceError {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnFaceError::ModelInvalid(msg.to_string(), e)
  }
}

/// 单类别 YOLO 结构的人脸模型，运行在 RKNN NPU 上
///
/// URL 形如 `rknn:///models/face.rknn?score=0.3&nms=0.45`。
pub struct RknnFaceLocator {
  context: Context,
  score_threshold: f32,
  nms_threshold: f32,
}

impl FromUrlWithScheme for RknnFaceLocator {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnFaceLocator {
  type Error = RknnFaceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnFaceError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query = |key: &str| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<f32>().ok())
    };
    let score_threshold = query("score").unwrap_or(DEFAULT_SCORE_THRESH);
    let nms_threshold = query("nms").unwrap_or(DEFAULT_NMS_THRESH);

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| RknnFaceError::ModelPathError(e.to_string()))?;
    Self::load(&model_path, InitFlags::default(), score_threshold, nms_threshold)
  }
}

impl RknnFaceLocator {
  pub fn load(
    model_path: &str,
    flags: InitFlags,
    score_threshold: f32,
    nms_threshold: f32,
  ) -> Result<Self, RknnFaceError> {
    info!("加载人脸模型文件: {}", model_path);
    let model_data = std::fs::read(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnFaceError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnFaceError::invalid("无法获取输出数量", e))?;

    if num_inputs != FACE_NUM_INPUTS || num_outputs != FACE_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        FACE_NUM_INPUTS, FACE_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnFaceError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("人脸模型加载完成");
    Ok(Self {
      context,
      score_threshold,
      nms_threshold,
    })
  }

  fn infer(&self, image: &RgbImage) -> Result<Vec<Detection>, RknnFaceError> {
    let resized = imageops::resize(
      image,
      FACE_INPUT_W,
      FACE_INPUT_H,
      imageops::FilterType::Triangle,
    );
    self.context.set_input(
      0,
      resized.as_raw(),
      TensorFormat::NHWC,
      TensorType::UInt8,
    )?;
    self.context.run()?;
    let output = self.context.get_outputs()?;

    let mut boxes = Vec::new();
    for (head_idx, (&(map_h, map_w), stride)) in
      FACE_HEAD_SIZES.iter().zip(FACE_STRIDES).enumerate()
    {
      let (first, second) = (
        output.get_f32(head_idx * 2)?,
        output.get_f32(head_idx * 2 + 1)?,
      );
      let Some((reg, cls)) = split_head(first, second, map_h * map_w) else {
        error!(
          "检测头 {}: 输出大小不匹配 - {} / {}",
          head_idx,
          first.len(),
          second.len()
        );
        continue;
      };
      decode_head(reg, cls, map_h, map_w, stride, self.score_threshold, &mut boxes);
    }

    // 从模型输入尺寸缩放回原图
    let scale_x = image.width() as f32 / FACE_INPUT_W as f32;
    let scale_y = image.height() as f32 / FACE_INPUT_H as f32;
    let detections = boxes
      .into_iter()
      .map(|(bbox, score)| {
        Detection::from_xyxy(
          [
            bbox[0] * scale_x,
            bbox[1] * scale_y,
            bbox[2] * scale_x,
            bbox[3] * scale_y,
          ],
          score,
        )
      })
      .collect();

    Ok(non_max_suppression(detections, self.nms_threshold))
  }
}

impl FaceLocator for RknnFaceLocator {
  fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectError> {
    Ok(self.infer(image)?)
  }
}

/// RKNN 的输出顺序不固定，按张量大小区分回归 (4 通道) 和分类 (1 通道)
fn split_head<'a>(
  first: &'a [f32],
  second: &'a [f32],
  spatial: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  match (first.len(), second.len()) {
    (r, c) if r == 4 * spatial && c == spatial => Some((first, second)),
    (c, r) if r == 4 * spatial && c == spatial => Some((second, first)),
    _ => None,
  }
}

/// 解码一个检测头，输出模型输入坐标系下的 [x_min, y_min, x_max, y_max] 和得分
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  map_h: usize,
  map_w: usize,
  stride: f32,
  score_threshold: f32,
  boxes: &mut Vec<([f32; 4], f32)>,
) {
  let spatial = map_h * map_w;
  let (input_w, input_h) = (FACE_INPUT_W as f32, FACE_INPUT_H as f32);

  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;
      let score = sigmoid(cls[idx]);
      if score <= score_threshold {
        continue;
      }

      let grid_x = w as f32 + 0.5;
      let grid_y = h as f32 + 0.5;
      let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
      let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
      let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
      let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

      if xmax > xmin && ymax > ymin {
        boxes.push(([xmin, ymin, xmax, ymax], score));
      }
    }
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
