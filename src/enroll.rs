// 该文件是 Jingtou （镜头） 项目的一部分。
// src/enroll.rs - 人脸锚点注册
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

use chrono::Utc;
use image::imageops;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detect::{DetectError, FaceDetection, FaceLocator},
  engine::{Engine, EngineError},
  frame::Frame,
  output::DisplaySink,
};

#[derive(Error, Debug)]
pub enum EnrollError {
  #[error("人脸检测错误: {0}")]
  Detect(#[from] DetectError),
  #[error("取帧失败: {0}")]
  Engine(#[from] EngineError),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("尝试 {0} 次后仍未检测到人脸")]
  AttemptsExhausted(u32),
}

/// 人脸识别模块
///
/// 在帧中找到人脸并把裁剪结果保存到 `output_dir` 时返回 `true`。
pub trait FaceRecognizer {
  fn detect_save_faces(&mut self, frame: &Frame, output_dir: &Path) -> Result<bool, EnrollError>;
}

impl<R: FaceRecognizer + ?Sized> FaceRecognizer for Box<R> {
  fn detect_save_faces(&mut self, frame: &Frame, output_dir: &Path) -> Result<bool, EnrollError> {
    (**self).detect_save_faces(frame, output_dir)
  }
}

/// 把帧中最大的人脸保存为锚点图片
pub struct AnchorRecorder<L> {
  detection: FaceDetection<L>,
  saved: u32,
}

impl<L: FaceLocator> AnchorRecorder<L> {
  pub fn new(detection: FaceDetection<L>) -> Self {
    Self {
      detection,
      saved: 0,
    }
  }

  pub fn saved(&self) -> u32 {
    self.saved
  }

  pub fn into_detection(self) -> FaceDetection<L> {
    self.detection
  }
}

impl<L: FaceLocator> FaceRecognizer for AnchorRecorder<L> {
  fn detect_save_faces(&mut self, frame: &Frame, output_dir: &Path) -> Result<bool, EnrollError> {
    let detections = self.detection.detect(frame)?;
    let Some(face) = detections.iter().max_by_key(|det| det.area()) else {
      return Ok(false);
    };

    let (w, h) = (frame.width() as i32, frame.height() as i32);
    let (left, right) = (face.left.clamp(0, w), face.right.clamp(0, w));
    let (top, bottom) = (face.top.clamp(0, h), face.bottom.clamp(0, h));
    if right <= left || bottom <= top {
      warn!("人脸框不在画面内: {:?}", face);
      return Ok(false);
    }

    let crop = imageops::crop_imm(
      &frame.image,
      left as u32,
      top as u32,
      (right - left) as u32,
      (bottom - top) as u32,
    )
    .to_image();

    std::fs::create_dir_all(output_dir)?;
    self.saved += 1;
    let path = output_dir.join(format!(
      "anchor-{}-{}.png",
      Utc::now().format("%Y%m%d%H%M%S"),
      self.saved
    ));
    crop.save(&path)?;
    info!("人脸锚点已保存: {}", path.display());

    Ok(true)
  }
}

/// 反复取帧直到识别模块保存了人脸，返回尝试次数
///
/// `max_attempts` 为 `None` 时不设上限，取不到人脸就一直重试。
pub fn enroll<O, R>(
  engine: &mut Engine<O>,
  recognizer: &mut R,
  output_dir: &Path,
  max_attempts: Option<u32>,
) -> Result<u32, EnrollError>
where
  O: DisplaySink,
  R: FaceRecognizer + ?Sized,
{
  info!("开始注册人脸锚点: {}", output_dir.display());
  let mut attempts = 0;

  loop {
    if let Some(max) = max_attempts
      && attempts >= max
    {
      return Err(EnrollError::AttemptsExhausted(attempts));
    }
    attempts += 1;

    let frame = engine.capture_frame()?;
    if recognizer.detect_save_faces(&frame, output_dir)? {
      info!("第 {} 次尝试注册成功", attempts);
      return Ok(attempts);
    }
    debug!("第 {} 次尝试未检测到人脸，重试", attempts);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::Detection;
  use crate::detect::tests::FixedLocator;
  use image::{Rgb, RgbImage};

  fn gradient(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
    Frame::new(image, 0, 0)
  }

  fn png_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
      .unwrap()
      .map(|entry| entry.unwrap().path())
      .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
      .collect();
    files.sort();
    files
  }

  #[test]
  fn largest_face_is_cropped_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let anchors = dir.path().join("faces");
    let locator = FixedLocator::new(vec![
      Detection::new(0, 0, 2, 2, 0.9),
      Detection::new(4, 3, 12, 13, 0.8),
    ]);
    let mut recorder = AnchorRecorder::new(FaceDetection::new(locator));

    assert!(recorder.detect_save_faces(&gradient(20, 20), &anchors).unwrap());
    assert_eq!(recorder.saved(), 1);

    let files = png_files(&anchors);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("anchor-") && name.ends_with("-1.png"));

    let crop = image::open(&files[0]).unwrap().to_rgb8();
    assert_eq!(crop.dimensions(), (10, 8));
    assert_eq!(*crop.get_pixel(0, 0), Rgb([3, 4, 0]));
  }

  #[test]
  fn no_face_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let anchors = dir.path().join("faces");
    let mut recorder = AnchorRecorder::new(FaceDetection::new(FixedLocator::new(vec![])));

    assert!(!recorder.detect_save_faces(&gradient(8, 8), &anchors).unwrap());
    assert!(!anchors.exists());
  }

  #[test]
  fn low_confidence_face_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let locator = FixedLocator::new(vec![Detection::new(0, 0, 4, 4, 0.1)]);
    let mut recorder = AnchorRecorder::new(FaceDetection::new(locator));
    assert!(!recorder.detect_save_faces(&gradient(8, 8), dir.path()).unwrap());
  }

  #[test]
  fn face_crossing_the_border_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let locator = FixedLocator::new(vec![Detection::new(-3, 5, 4, 20, 0.9)]);
    let mut recorder = AnchorRecorder::new(FaceDetection::new(locator));

    assert!(recorder.detect_save_faces(&gradient(8, 8), dir.path()).unwrap());
    let crop = image::open(&png_files(dir.path())[0]).unwrap().to_rgb8();
    assert_eq!(crop.dimensions(), (3, 4));
  }

  #[test]
  fn face_outside_the_frame_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let locator = FixedLocator::new(vec![Detection::new(10, 10, 20, 20, 0.9)]);
    let mut recorder = AnchorRecorder::new(FaceDetection::new(locator));
    assert!(!recorder.detect_save_faces(&gradient(8, 8), dir.path()).unwrap());
  }
}
