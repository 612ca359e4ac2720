// 该文件是 Jingtou （镜头） 项目的一部分。
// tests/engine.rs - 主循环集成测试
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use rstest::rstest;
use url::Url;

use jingtou::{
  detect::{DetectError, Detection, FaceDetection, FaceLocator},
  engine::{Engine, EngineConfig, EngineError, Termination},
  enroll::{AnchorRecorder, EnrollError, FaceRecognizer, enroll},
  frame::Frame,
  input::{
    FileVideoSource, FrameRange, FrameReader, FrameSource, InputError, ReaderBackends,
    SourceConfig, WebcamSource,
  },
  output::{DisplayAction, DisplayError, DisplaySink},
  transform::{FnTransform, TransformChain},
};

/// 产生 `count` 帧的解码后端，第 i 帧的像素值为 i
struct CountingReader {
  count: u8,
  next: u8,
}

impl CountingReader {
  fn new(count: u8) -> Self {
    Self { count, next: 0 }
  }
}

impl FrameReader for CountingReader {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    if self.next >= self.count {
      return Ok(None);
    }
    let value = self.next;
    self.next += 1;
    Ok(Some(RgbImage::from_fn(4, 3, |x, y| {
      Rgb([value, x as u8, y as u8])
    })))
  }

  fn fps(&self) -> Option<f64> {
    Some(10.0)
  }
}

/// 记录显示过的帧
#[derive(Default)]
struct RecordingSink {
  frames: Vec<Frame>,
  quit_after: Option<usize>,
}

impl RecordingSink {
  fn quitting_after(count: usize) -> Self {
    Self {
      frames: Vec::new(),
      quit_after: Some(count),
    }
  }

  fn indices(&self) -> Vec<u64> {
    self.frames.iter().map(|f| f.index).collect()
  }
}

impl DisplaySink for RecordingSink {
  fn show(&mut self, frame: &Frame) -> Result<DisplayAction, DisplayError> {
    self.frames.push(frame.clone());
    if self.quit_after == Some(self.frames.len()) {
      Ok(DisplayAction::Quit)
    } else {
      Ok(DisplayAction::Continue)
    }
  }
}

fn video_config() -> EngineConfig {
  EngineConfig::new(SourceConfig::Video(PathBuf::from("clip.mp4")))
}

fn video(count: u8, start: u64, end: u64) -> FrameSource {
  FrameSource::File(FileVideoSource::new(
    Box::new(CountingReader::new(count)),
    FrameRange::new(start, end),
  ))
}

fn write_image(dir: &Path) -> PathBuf {
  let path = dir.join("still.png");
  RgbImage::from_fn(6, 4, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 0]))
    .save(&path)
    .unwrap();
  path
}

#[test]
fn pipeline_without_transforms_is_identity() {
  let mut engine = Engine::new(
    video_config().with_break_on_end(true),
    TransformChain::new(),
    RecordingSink::default(),
  );
  let mut expected = CountingReader::new(3);

  assert_eq!(engine.drive(video(3, 0, 0)).unwrap(), Termination::StreamEnded);
  for frame in &engine.sink().frames {
    assert_eq!(Some(frame.image.clone()), expected.read().unwrap());
  }
  assert_eq!(engine.sink().frames.len(), 3);
}

#[rstest]
#[case(true, Termination::StreamEnded)]
#[case(false, Termination::Completed)]
fn ten_frames_trimmed_to_three_through_eight(
  #[case] break_on_end: bool,
  #[case] expected: Termination,
) {
  let mut engine = Engine::new(
    video_config()
      .with_frame_range(3, 8)
      .with_break_on_end(break_on_end),
    TransformChain::new(),
    RecordingSink::quitting_after(20),
  );

  let termination = engine.drive(video(10, 3, 8)).unwrap();

  assert_eq!(termination, expected);
  assert_eq!(engine.sink().indices(), vec![3, 4, 5, 6, 7]);
  for frame in &engine.sink().frames {
    assert_eq!(frame.image.get_pixel(0, 0)[0] as u64, frame.index);
    assert_eq!(frame.timestamp_ms, frame.index * 100);
  }
}

#[rstest]
#[case(0, 0, vec![0, 1, 2, 3, 4, 5])]
#[case(2, 0, vec![2, 3, 4, 5])]
#[case(0, 2, vec![0, 1])]
#[case(4, 5, vec![4])]
#[case(5, 5, vec![])]
#[case(0, 20, vec![0, 1, 2, 3, 4, 5])]
fn trimming_keeps_order_without_duplicates(
  #[case] start: u64,
  #[case] end: u64,
  #[case] expected: Vec<u64>,
) {
  let mut engine = Engine::new(
    video_config().with_break_on_end(true),
    TransformChain::new(),
    RecordingSink::default(),
  );
  engine.drive(video(6, start, end)).unwrap();
  assert_eq!(engine.sink().indices(), expected);
}

#[test]
fn quit_key_stops_the_loop() {
  let mut engine = Engine::new(
    video_config().with_break_on_end(true),
    TransformChain::new(),
    RecordingSink::quitting_after(2),
  );
  assert_eq!(engine.drive(video(10, 0, 0)).unwrap(), Termination::UserQuit);
  assert_eq!(engine.sink().indices(), vec![0, 1]);
}

#[test]
fn trimmed_video_is_played_once() {
  let mut engine = Engine::new(
    video_config().with_frame_range(1, 3),
    TransformChain::new(),
    RecordingSink::quitting_after(5),
  );
  assert_eq!(engine.drive(video(10, 1, 3)).unwrap(), Termination::Completed);
  assert_eq!(engine.sink().indices(), vec![1, 2]);
}

#[test]
fn flip_and_transforms_apply_to_every_frame() {
  let chain = TransformChain::new().with_transform(FnTransform::new(|mut frame: Frame| {
    frame.image.put_pixel(0, 0, Rgb([255, 255, 255]));
    Ok(frame)
  }));
  let mut engine = Engine::new(
    video_config().with_flip(true).with_break_on_end(true),
    chain,
    RecordingSink::default(),
  );
  engine.drive(video(2, 0, 0)).unwrap();

  for frame in &engine.sink().frames {
    assert_eq!(*frame.image.get_pixel(0, 0), Rgb([255, 255, 255]));
    // 镜像后最右侧一列来自原图第 0 列
    assert_eq!(frame.image.get_pixel(3, 1)[1], 0);
    assert_eq!(frame.image.get_pixel(1, 1)[1], 2);
  }
}

/// 打不开任何设备的后端
struct Unplugged;

impl ReaderBackends for Unplugged {
  fn open_device(&self, path: &Path) -> Result<Box<dyn FrameReader>, InputError> {
    Err(InputError::unavailable(path.display(), "No such device"))
  }

  fn open_stream(&self, url: &Url) -> Result<Box<dyn FrameReader>, InputError> {
    Err(InputError::unavailable(url, "Connection refused"))
  }

  fn open_video(&self, path: &Path) -> Result<Box<dyn FrameReader>, InputError> {
    Err(InputError::unavailable(path.display(), "No such file"))
  }
}

#[rstest]
#[case("/dev/video-nonexistent")]
#[case("3")]
#[case("rtsp://192.168.0.150:554/cam/realmonitor")]
fn unavailable_webcam_fails_before_any_frame(#[case] input: &str) {
  let source = SourceConfig::parse(input).unwrap();
  let mut engine = Engine::new(
    EngineConfig::new(source),
    TransformChain::new(),
    RecordingSink::default(),
  )
  .with_backends(Unplugged);

  let result = engine.run();

  assert!(matches!(
    result,
    Err(EngineError::Input(InputError::SourceUnavailable { .. }))
  ));
  assert!(engine.sink().frames.is_empty());
}

#[test]
fn image_source_shows_exactly_one_frame() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)).with_break_on_end(true),
    TransformChain::new(),
    RecordingSink::default(),
  );

  assert_eq!(engine.run().unwrap(), Termination::StreamEnded);
  assert_eq!(engine.sink().frames.len(), 1);
  assert_eq!(engine.sink().frames[0].shape(), (4, 6, 3));
}

#[test]
fn image_source_completes_silently_by_default() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)),
    TransformChain::new(),
    RecordingSink::quitting_after(3),
  );

  assert_eq!(engine.process_image().unwrap(), Termination::Completed);
  assert_eq!(engine.sink().frames.len(), 1);
}

#[test]
fn missing_video_file_is_unavailable() {
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Video(PathBuf::from("/nonexistent/clip.mp4"))),
    TransformChain::new(),
    RecordingSink::default(),
  )
  .with_backends(Unplugged);
  assert!(matches!(
    engine.process_video(),
    Err(EngineError::Input(InputError::SourceUnavailable { .. }))
  ));
}

#[test]
fn capture_frame_transforms_without_displaying() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)).with_flip(true),
    TransformChain::new(),
    RecordingSink::default(),
  );

  let frame = engine.capture_frame().unwrap();

  assert_eq!(*frame.image.get_pixel(0, 0), Rgb([50, 0, 0]));
  assert!(engine.sink().frames.is_empty());
}

#[test]
fn capture_from_webcam_skips_empty_reads() {
  struct Flaky {
    misses: u8,
  }

  impl FrameReader for Flaky {
    fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
      if self.misses > 0 {
        self.misses -= 1;
        return Err(InputError::EmptyRead);
      }
      Ok(Some(RgbImage::from_pixel(2, 2, Rgb([42, 42, 42]))))
    }
  }

  let mut engine = Engine::new(video_config(), TransformChain::new(), RecordingSink::default());
  let source = FrameSource::Webcam(WebcamSource::new(Box::new(Flaky { misses: 3 })));
  let frame = engine.capture_frame_from(source).unwrap();
  assert_eq!(*frame.image.get_pixel(1, 1), Rgb([42, 42, 42]));
}

/// 前若干次找不到人脸的识别模块
struct SucceedsOnAttempt {
  attempt: u32,
  succeed_on: Option<u32>,
}

impl FaceRecognizer for SucceedsOnAttempt {
  fn detect_save_faces(&mut self, _frame: &Frame, _output_dir: &Path) -> Result<bool, EnrollError> {
    self.attempt += 1;
    Ok(self.succeed_on == Some(self.attempt))
  }
}

#[test]
fn enroll_retries_until_a_face_is_saved() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)),
    TransformChain::new(),
    RecordingSink::default(),
  );
  let mut recognizer = SucceedsOnAttempt {
    attempt: 0,
    succeed_on: Some(3),
  };

  let attempts = enroll(&mut engine, &mut recognizer, dir.path(), None).unwrap();
  assert_eq!(attempts, 3);
}

#[test]
fn enroll_gives_up_after_max_attempts() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)),
    TransformChain::new(),
    RecordingSink::default(),
  );
  let mut recognizer = SucceedsOnAttempt {
    attempt: 0,
    succeed_on: None,
  };

  let result = enroll(&mut engine, &mut recognizer, dir.path(), Some(2));
  assert!(matches!(result, Err(EnrollError::AttemptsExhausted(2))));
  assert_eq!(recognizer.attempt, 2);
}

#[test]
fn enroll_surfaces_unavailable_source() {
  let dir = tempfile::tempdir().unwrap();
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(dir.path().join("missing.png"))),
    TransformChain::new(),
    RecordingSink::default(),
  );
  let mut recognizer = SucceedsOnAttempt {
    attempt: 0,
    succeed_on: Some(1),
  };
  assert!(matches!(
    enroll(&mut engine, &mut recognizer, dir.path(), None),
    Err(EnrollError::Engine(EngineError::Input(
      InputError::SourceUnavailable { .. }
    )))
  ));
}

/// 总是在画面中央报告一张人脸
struct CenterFace;

impl FaceLocator for CenterFace {
  fn locate(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectError> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    Ok(vec![Detection::new(h / 4, w / 4, h * 3 / 4, w * 3 / 4, 0.95)])
  }
}

#[test]
fn anchor_recorder_enrolls_then_annotates() {
  let dir = tempfile::tempdir().unwrap();
  let path = write_image(dir.path());
  let anchors = dir.path().join("faces");

  let mut capture = Engine::new(
    EngineConfig::new(SourceConfig::Image(path.clone())),
    TransformChain::new(),
    RecordingSink::default(),
  );
  let mut recorder = AnchorRecorder::new(FaceDetection::new(CenterFace));
  assert_eq!(enroll(&mut capture, &mut recorder, &anchors, Some(1)).unwrap(), 1);
  assert_eq!(std::fs::read_dir(&anchors).unwrap().count(), 1);

  let chain = TransformChain::new().with_transform(recorder.into_detection());
  let mut engine = Engine::new(
    EngineConfig::new(SourceConfig::Image(path)).with_break_on_end(true),
    chain,
    RecordingSink::default(),
  );
  assert_eq!(engine.run().unwrap(), Termination::StreamEnded);

  let frame = &engine.sink().frames[0];
  assert_eq!(frame.shape(), (4, 6, 3));
  assert_eq!(*frame.image.get_pixel(1, 1), Rgb([255, 255, 255]));
}
