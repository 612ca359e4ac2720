// 该文件是 Jingtou （镜头） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use image::ImageFormat;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{DisplayAction, DisplayError, DisplaySink},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不支持的图片格式: {0}")]
  UnsupportedExtension(String),
  #[error("路径解码失败: {0}")]
  InvalidPath(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

const DEFAULT_EXTENSION: &str = "png";

/// 把每一帧按日期保存到目录中
///
/// 文件位于 `<dir>/YYYY/MM/DD/HH-MM-SS-NNNN.<ext>`，NNNN 为十六进制帧计数。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  extension: String,
  frame_counter: u16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let extension = uri
      .query_pairs()
      .find(|(k, _)| k == "ext")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let directory = urlencoding::decode(uri.path())
      .map_err(|e| DirectoryRecordOutputError::InvalidPath(e.to_string()))?;

    Self::new(Path::new(directory.as_ref()), &extension)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: &Path, extension: &str) -> Result<Self, DirectoryRecordOutputError> {
    if ImageFormat::from_extension(extension).is_none() {
      return Err(DirectoryRecordOutputError::UnsupportedExtension(
        extension.to_string(),
      ));
    }

    Ok(Self {
      directory: directory.to_path_buf(),
      extension: extension.to_string(),
      frame_counter: 0,
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn frame_path(&mut self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.{}",
      now.format("%H-%M-%S"),
      self.frame_id(),
      self.extension
    )))
  }

  /// 保存一帧，返回写入的文件路径
  pub fn record(&mut self, frame: &Frame) -> Result<PathBuf, DirectoryRecordOutputError> {
    let path = self.frame_path(Utc::now())?;
    frame.image.save(&path)?;
    debug!("第 {} 帧已保存: {}", frame.index, path.display());
    Ok(path)
  }
}

impl DisplaySink for DirectoryRecordOutput {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    self.record(frame)?;
    Ok(DisplayAction::Continue)
  }
}
