// 该文件是 Jingtou （镜头） 项目的一部分。
// src/input/file_video.rs - 视频文件输入源
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

use tracing::debug;
use url::Url;

use super::{FrameRange, FrameReader, InputError, decode_path, open_video};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 视频文件输入源
///
/// 起始帧之前的帧在这里直接丢弃，不会进入后续的处理链。
pub struct FileVideoSource {
  /// 解码后端
  reader: Box<dyn FrameReader>,
  /// 帧范围
  range: FrameRange,
  /// 下一帧的索引
  frame_index: u64,
  /// 是否结束
  finished: bool,
}

impl FromUrlWithScheme for FileVideoSource {
  const SCHEME: &'static str = "file";
}

impl FromUrl for FileVideoSource {
  type Error = InputError;

  /// `file:///video.mp4?start=10&end=100`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = |key: &str| -> Result<u64, InputError> {
      match url.query_pairs().find(|(k, _)| k == key) {
        Some((_, v)) => v
          .parse()
          .map_err(|_| InputError::InvalidSource(format!("{}={} 不是有效的帧号", key, v))),
        None => Ok(0),
      }
    };
    let range = FrameRange::new(query("start")?, query("end")?);

    let path = decode_path(url)?;
    Ok(Self::new(open_video(&path)?, range))
  }
}

impl FileVideoSource {
  pub fn new(reader: Box<dyn FrameReader>, range: FrameRange) -> Self {
    Self {
      reader,
      range,
      frame_index: 0,
      finished: false,
    }
  }

  pub fn range(&self) -> FrameRange {
    self.range
  }

  pub fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    if self.finished {
      return Ok(None);
    }

    loop {
      if self.range.is_past_end(self.frame_index) {
        debug!("到达结束帧 {}", self.range.end);
        self.finished = true;
        return Ok(None);
      }

      match self.reader.read() {
        Ok(Some(image)) => {
          let index = self.frame_index;
          self.frame_index += 1;
          if self.range.is_before_start(index) {
            continue;
          }
          return Ok(Some(Frame::new(image, index, self.timestamp_ms(index))));
        }
        Ok(None) => {
          debug!("视频文件读取完毕，共 {} 帧", self.frame_index);
          self.finished = true;
          return Ok(None);
        }
        Err(InputError::EmptyRead) => {
          debug!("跳过空帧");
        }
        Err(e) => {
          self.finished = true;
          return Err(e);
        }
      }
    }
  }

  /// 浮点转整数是饱和的，超大帧号得到 `u64::MAX`
  fn timestamp_ms(&self, index: u64) -> u64 {
    self
      .reader
      .fps()
      .filter(|fps| *fps > 0.0)
      .map_or(0, |fps| (index as f64 * 1000.0 / fps) as u64)
  }
}
