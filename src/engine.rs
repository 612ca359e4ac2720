// 该文件是 Jingtou （镜头） 项目的一部分。
// src/engine.rs - 处理主循环
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::Frame,
  input::{
    FeatureBackends, FrameRange, FrameSource, InputError, InputSourceType, ReaderBackends,
    SourceConfig,
  },
  output::{DisplayAction, DisplayError, DisplaySink},
  transform::TransformChain,
};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("帧处理失败: {0}")]
  Transform(anyhow::Error),
  #[error("显示错误: {0}")]
  Display(#[from] DisplayError),
  #[error("输入流结束，没有取到帧")]
  NoFrame,
  #[error("当前输入是 {actual:?}，不能按 {expected:?} 处理")]
  ModeMismatch {
    expected: InputSourceType,
    actual: InputSourceType,
  },
}

/// 主循环结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
  /// 显示端请求退出（按 `q` 或收到中断信号）
  UserQuit,
  /// 输入流耗尽，且配置要求上报（`break_on_end`）
  StreamEnded,
  /// 输入流耗尽，正常结束
  Completed,
}

/// 运行配置，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  pub source: SourceConfig,
  pub flip_view: bool,
  pub frame_range: FrameRange,
  /// 输入耗尽时为 true 返回 `StreamEnded`，否则返回 `Completed`
  pub break_on_end: bool,
}

impl EngineConfig {
  pub fn new(source: SourceConfig) -> Self {
    Self {
      source,
      flip_view: false,
      frame_range: FrameRange::default(),
      break_on_end: false,
    }
  }

  pub fn with_flip(mut self, flip_view: bool) -> Self {
    self.flip_view = flip_view;
    self
  }

  pub fn with_frame_range(mut self, start: u64, end: u64) -> Self {
    self.frame_range = FrameRange::new(start, end);
    self
  }

  pub fn with_break_on_end(mut self, break_on_end: bool) -> Self {
    self.break_on_end = break_on_end;
    self
  }

  pub fn source_type(&self) -> InputSourceType {
    match self.source {
      SourceConfig::Webcam(_) => InputSourceType::Webcam,
      SourceConfig::Video(_) => InputSourceType::Video,
      SourceConfig::Image(_) => InputSourceType::Image,
    }
  }
}

/// 读帧、镜像、处理链、显示，循环到退出或输入结束
pub struct Engine<O> {
  config: EngineConfig,
  chain: TransformChain,
  sink: O,
  backends: Box<dyn ReaderBackends>,
}

impl<O: DisplaySink> Engine<O> {
  pub fn new(config: EngineConfig, chain: TransformChain, sink: O) -> Self {
    let chain = chain.with_flip(config.flip_view);
    Self {
      config,
      chain,
      sink,
      backends: Box::new(FeatureBackends),
    }
  }

  /// 替换打开摄像头、网络流和视频文件所用的后端
  pub fn with_backends(mut self, backends: impl ReaderBackends + 'static) -> Self {
    self.backends = Box::new(backends);
    self
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn sink(&self) -> &O {
    &self.sink
  }

  pub fn sink_mut(&mut self) -> &mut O {
    &mut self.sink
  }

  pub fn into_sink(self) -> O {
    self.sink
  }

  /// 按配置的输入类型选择一种处理模式
  pub fn run(&mut self) -> Result<Termination, EngineError> {
    match self.config.source_type() {
      InputSourceType::Video => self.process_video(),
      InputSourceType::Image => self.process_image(),
      InputSourceType::Webcam => self.process_webcam(),
    }
  }

  pub fn process_video(&mut self) -> Result<Termination, EngineError> {
    self.process(InputSourceType::Video)
  }

  pub fn process_image(&mut self) -> Result<Termination, EngineError> {
    self.process(InputSourceType::Image)
  }

  pub fn process_webcam(&mut self) -> Result<Termination, EngineError> {
    self.process(InputSourceType::Webcam)
  }

  fn process(&mut self, expected: InputSourceType) -> Result<Termination, EngineError> {
    let source = self.open(expected)?;
    self.drive(source)
  }

  fn open(&self, expected: InputSourceType) -> Result<FrameSource, EngineError> {
    let actual = self.config.source_type();
    if actual != expected {
      return Err(EngineError::ModeMismatch { expected, actual });
    }
    self.open_source()
  }

  fn open_source(&self) -> Result<FrameSource, EngineError> {
    Ok(FrameSource::open_with(
      &self.config.source,
      self.config.frame_range,
      self.backends.as_ref(),
    )?)
  }

  /// 主循环
  ///
  /// 输入源在这里被消耗，任何退出路径上都会随之释放。
  pub fn drive(&mut self, mut source: FrameSource) -> Result<Termination, EngineError> {
    info!("开始处理 {:?} 输入", source.source_type());
    let started = Instant::now();
    let mut total = 0u64;

    while let Some(frame) = source.next_frame()? {
      total += 1;
      let frame = self.chain.process(frame).map_err(EngineError::Transform)?;
      if self.sink.show(&frame)? == DisplayAction::Quit {
        info!(
          "用户退出，共处理 {} 帧，耗时 {:.2?}",
          total,
          started.elapsed()
        );
        return Ok(Termination::UserQuit);
      }
    }
    drop(source);

    if self.config.break_on_end {
      info!(
        "输入流结束，共处理 {} 帧，耗时 {:.2?}",
        total,
        started.elapsed()
      );
      Ok(Termination::StreamEnded)
    } else {
      debug!("处理完成，共 {} 帧", total);
      Ok(Termination::Completed)
    }
  }

  /// 打开配置的输入，取一帧处理后返回，不显示
  pub fn capture_frame(&mut self) -> Result<Frame, EngineError> {
    let source = self.open_source()?;
    self.capture_frame_from(source)
  }

  /// 从给定输入取一帧，空读会被跳过
  pub fn capture_frame_from(&mut self, mut source: FrameSource) -> Result<Frame, EngineError> {
    let frame = source.next_frame()?.ok_or(EngineError::NoFrame)?;
    drop(source);
    debug!("已捕获第 {} 帧", frame.index);
    self.chain.process(frame).map_err(EngineError::Transform)
  }
}
