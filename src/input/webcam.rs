// 该文件是 Jingtou （镜头） 项目的一部分。
// src/input/webcam.rs - 摄像头输入源
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{FrameReader, InputError};
use crate::frame::Frame;

/// 摄像头输入源（本地设备或网络流）
///
/// 空读不会被当作流结束，而是记录后重试。
pub struct WebcamSource {
  /// 解码后端
  reader: Box<dyn FrameReader>,
  /// 帧索引
  frame_index: u64,
  /// 开始时间
  start_time: Instant,
  /// 是否结束
  finished: bool,
}

impl WebcamSource {
  pub fn new(reader: Box<dyn FrameReader>) -> Self {
    Self {
      reader,
      frame_index: 0,
      start_time: Instant::now(),
      finished: false,
    }
  }

  pub fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    if self.finished {
      return Ok(None);
    }

    loop {
      match self.reader.read() {
        Ok(Some(image)) => {
          let timestamp_ms = elapsed_ms(self.start_time.elapsed());
          let frame = Frame::new(image, self.frame_index, timestamp_ms);
          self.frame_index += 1;
          return Ok(Some(frame));
        }
        Ok(None) => {
          info!("摄像头输入流已结束，共 {} 帧", self.frame_index);
          self.finished = true;
          return Ok(None);
        }
        Err(InputError::EmptyRead) => {
          warn!("忽略空的摄像头帧");
        }
        Err(e) => return Err(e),
      }
    }
  }
}

/// 毫秒数超出 u64 时取最大值
fn elapsed_ms(elapsed: Duration) -> u64 {
  u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::tests::{ScriptedReader, Step, pixel_value};

  #[test]
  fn empty_reads_are_retried() {
    let reader = ScriptedReader::new(vec![
      Step::Empty,
      Step::Frame(10),
      Step::Empty,
      Step::Empty,
      Step::Frame(20),
    ]);
    let mut source = WebcamSource::new(Box::new(reader));

    let first = source.next_frame().unwrap().unwrap();
    let second = source.next_frame().unwrap().unwrap();
    assert_eq!((first.index, pixel_value(&first)), (0, 10));
    assert_eq!((second.index, pixel_value(&second)), (1, 20));
    assert!(source.next_frame().unwrap().is_none());
  }

  #[test]
  fn elapsed_time_saturates() {
    assert_eq!(elapsed_ms(Duration::from_millis(1500)), 1500);
    assert_eq!(elapsed_ms(Duration::MAX), u64::MAX);
  }

  #[test]
  fn ended_stream_stays_ended() {
    let mut source = WebcamSource::new(Box::new(ScriptedReader::frames(0)));
    assert!(source.next_frame().unwrap().is_none());
    assert!(source.next_frame().unwrap().is_none());
  }
}
