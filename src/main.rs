// 该文件是 Jingtou （镜头） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use jingtou::{
  FromUrl,
  detect::{FaceDetection, FaceLocator},
  engine::{Engine, EngineConfig, Termination},
  enroll::{AnchorRecorder, enroll},
  input::SourceConfig,
  output::{HeadlessDisplay, OutputWrapper},
  transform::{FpsMeter, TransformChain},
};

const FORCE_EXIT_SECS: u64 = 30;

fn install_interrupt_handler() -> Result<Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(FORCE_EXIT_SECS));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;
  Ok(rx)
}

#[cfg(feature = "model_rknn")]
fn open_face_locator(url: &Url) -> Result<Box<dyn FaceLocator>> {
  let locator = jingtou::detect::RknnFaceLocator::from_url(url)?;
  Ok(Box::new(locator))
}

#[cfg(not(feature = "model_rknn"))]
fn open_face_locator(url: &Url) -> Result<Box<dyn FaceLocator>> {
  bail!("无法加载人脸模型 {}: 未启用 model_rknn 特性", url)
}

#[cfg(feature = "window_display")]
fn window_output() -> Result<Option<OutputWrapper>> {
  Ok(Some(OutputWrapper::Window(
    jingtou::output::WindowDisplay::new("Jingtou"),
  )))
}

#[cfg(not(feature = "window_display"))]
fn window_output() -> Result<Option<OutputWrapper>> {
  warn!("未启用 window_display 特性，忽略 --show");
  Ok(None)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  let source = SourceConfig::parse(&args.input)?;
  let config = EngineConfig::new(source)
    .with_flip(args.flip)
    .with_frame_range(args.start_frame, args.end_frame)
    .with_break_on_end(args.break_on_end);

  let mut detection = match &args.face_model {
    Some(url) => {
      info!("人脸模型: {}", url);
      let locator = open_face_locator(url)?;
      Some(FaceDetection::new(locator).with_min_confidence(args.min_confidence))
    }
    None => None,
  };

  if let Some(anchors) = &args.anchors {
    let Some(face) = detection.take() else {
      bail!("注册人脸锚点需要 --face-model");
    };
    let capture_config = config.clone();
    let mut capture = Engine::new(capture_config, TransformChain::new(), HeadlessDisplay::new());
    let mut recorder = AnchorRecorder::new(face);
    let attempts = enroll(&mut capture, &mut recorder, anchors, args.max_enroll_attempts)?;
    info!("人脸锚点注册完成，尝试 {} 次", attempts);
    detection = Some(recorder.into_detection());
  }

  let mut chain = TransformChain::new();
  if let Some(face) = detection {
    chain = chain.with_transform(face);
  }
  if args.fps {
    let meter = match &args.fps_font {
      Some(font) => FpsMeter::new()
        .with_font_file(font)
        .with_context(|| format!("无法加载字体 {}", font.display()))?,
      None => FpsMeter::new(),
    };
    chain = chain.with_transform(meter);
  }

  let interrupt = install_interrupt_handler()?;
  let mut outputs = vec![OutputWrapper::Headless(
    HeadlessDisplay::new().with_interrupt(interrupt),
  )];
  if args.show
    && let Some(window) = window_output()?
  {
    outputs.push(window);
  }
  for url in &args.record {
    info!("输出: {}", url);
    outputs.push(OutputWrapper::from_url(url)?);
  }

  let mut engine = Engine::new(config, chain, outputs);
  match engine.run()? {
    Termination::UserQuit => info!("用户退出"),
    Termination::StreamEnded => info!("输入流结束"),
    Termination::Completed => info!("处理完成"),
  }

  Ok(())
}
