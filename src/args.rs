// 该文件是 Jingtou （镜头） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Jingtou 人脸检测视频管线
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 摄像头: 0, /dev/video0 或 v4l2:///dev/video0
  /// - 网络流: rtsp://..., http://...
  /// - 视频: *.mp4, *.avi, *.mkv 等，或 file:///video.mp4
  /// - 图片: *.jpg, *.png 等，或 image:///photo.png
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 在窗口中显示画面，按 q 退出
  #[arg(long)]
  pub show: bool,

  /// 水平镜像画面
  #[arg(long)]
  pub flip: bool,

  /// 从视频的第几帧开始处理
  #[arg(long, default_value_t = 0, value_name = "FRAME")]
  pub start_frame: u64,

  /// 处理到视频的第几帧（不含），0 表示到结尾
  #[arg(long, default_value_t = 0, value_name = "FRAME")]
  pub end_frame: u64,

  /// 输入结束后退出，而不是从头循环
  #[arg(long)]
  pub break_on_end: bool,

  /// 人脸检测模型，例如 rknn:///models/face.rknn
  #[arg(long, value_name = "MODEL")]
  pub face_model: Option<Url>,

  /// 人脸置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub min_confidence: f32,

  /// 人脸锚点目录，设置后先注册一张人脸
  #[arg(long, value_name = "DIR")]
  pub anchors: Option<PathBuf>,

  /// 注册人脸的最大尝试次数，不设置则一直重试
  #[arg(long, value_name = "COUNT")]
  pub max_enroll_attempts: Option<u32>,

  /// 额外输出，可重复，例如 folder:///records?ext=jpg 或 gst:///out.mp4?fps=30
  #[arg(long, value_name = "OUTPUT")]
  pub record: Vec<Url>,

  /// 统计帧率
  #[arg(long)]
  pub fps: bool,

  /// 帧率文字使用的 TTF 字体，不设置则只写日志
  #[arg(long, value_name = "FILE")]
  pub fps_font: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_arguments_use_defaults() {
    let args = Args::try_parse_from(["jingtou", "--input", "0"]).unwrap();
    assert_eq!(args.input, "0");
    assert!(!args.show && !args.flip && !args.break_on_end && !args.fps);
    assert_eq!((args.start_frame, args.end_frame), (0, 0));
    assert_eq!(args.min_confidence, 0.5);
    assert!(args.face_model.is_none() && args.anchors.is_none());
    assert!(args.record.is_empty());
  }

  #[test]
  fn record_is_repeatable() {
    let args = Args::try_parse_from([
      "jingtou",
      "--input",
      "clip.mp4",
      "--record",
      "folder:///tmp/a",
      "--record",
      "gst:///tmp/b.mp4?fps=25",
      "--start-frame",
      "3",
      "--end-frame",
      "8",
    ])
    .unwrap();
    assert_eq!(args.record.len(), 2);
    assert_eq!(args.record[1].scheme(), "gst");
    assert_eq!((args.start_frame, args.end_frame), (3, 8));
  }

  #[test]
  fn input_is_required() {
    assert!(Args::try_parse_from(["jingtou", "--show"]).is_err());
  }
}
