// 该文件是 Jingtou （镜头） 项目的一部分。
// src/transform.rs - 帧处理链
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

use image::imageops;

use crate::frame::Frame;

mod fps;
pub use self::fps::FpsMeter;

/// 帧处理步骤
///
/// 步骤可以持有自己的状态（例如帧率统计），处理链本身不保存任何状态。
pub trait Transform {
  fn apply(&mut self, frame: Frame) -> anyhow::Result<Frame>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
  fn apply(&mut self, frame: Frame) -> anyhow::Result<Frame> {
    (**self).apply(frame)
  }
}

/// 把闭包包装为处理步骤
pub struct FnTransform<F>(pub F);

impl<F> FnTransform<F>
where
  F: FnMut(Frame) -> anyhow::Result<Frame>,
{
  pub fn new(f: F) -> Self {
    Self(f)
  }
}

impl<F> Transform for FnTransform<F>
where
  F: FnMut(Frame) -> anyhow::Result<Frame>,
{
  fn apply(&mut self, frame: Frame) -> anyhow::Result<Frame> {
    (self.0)(frame)
  }
}

/// 水平镜像
#[derive(Debug, Clone, Copy, Default)]
pub struct Flip {
  pub enabled: bool,
}

impl Flip {
  pub fn new(enabled: bool) -> Self {
    Self { enabled }
  }
}

impl Transform for Flip {
  fn apply(&mut self, mut frame: Frame) -> anyhow::Result<Frame> {
    if self.enabled {
      imageops::flip_horizontal_in_place(&mut frame.image);
    }
    Ok(frame)
  }
}

/// 处理链：先镜像，再按声明顺序执行自定义步骤
#[derive(Default)]
pub struct TransformChain {
  flip: Flip,
  transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_flip(mut self, enabled: bool) -> Self {
    self.flip = Flip::new(enabled);
    self
  }

  pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
    self.transforms.push(Box::new(transform));
    self
  }

  pub fn push(&mut self, transform: Box<dyn Transform>) {
    self.transforms.push(transform);
  }

  pub fn len(&self) -> usize {
    self.transforms.len()
  }

  pub fn is_empty(&self) -> bool {
    self.transforms.is_empty()
  }

  pub fn process(&mut self, frame: Frame) -> anyhow::Result<Frame> {
    let frame = self.flip.apply(frame)?;
    self
      .transforms
      .iter_mut()
      .try_fold(frame, |frame, transform| transform.apply(frame))
  }
}
