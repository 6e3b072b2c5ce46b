// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/session.rs - 显示会话
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{BaseImage, FrameError, ImageId, Tagged},
  model::DetectionBatch,
  output::draw::{DrawError, Overlay, PaintSummary},
  surface::{Container, Surface},
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("当前没有底图")]
  NoImage,
  #[error("图像解码失败: {0}")]
  Decode(String),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 输入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
  #[default]
  Camera,
  Image,
  Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
  #[default]
  Empty,
  Ready,
  Failed(String),
}

/// 推理结果交给会话后的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
  Applied(PaintSummary),
  /// 结果对应的底图已被替换，结果被丢弃
  Stale,
}

/// 一个显示会话
///
/// 会话独占绘制表面，持有当前底图与当前检测结果。
/// 底图被替换时旧的检测结果一并丢弃，迟到的推理结果通过底图标识识别并丢弃。
pub struct DetectionSession {
  mode: InputMode,
  surface: Surface,
  overlay: Overlay,
  container: Container,
  backing_scale: f32,
  image: Option<BaseImage>,
  batch: Option<DetectionBatch>,
  status: SessionStatus,
}

impl DetectionSession {
  pub fn new(overlay: Overlay, container: Container, backing_scale: f32) -> Self {
    Self {
      mode: InputMode::default(),
      surface: Surface::new(),
      overlay,
      container,
      backing_scale,
      image: None,
      batch: None,
      status: SessionStatus::Empty,
    }
  }

  pub fn with_mode(mut self, mode: InputMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn mode(&self) -> InputMode {
    self.mode
  }

  pub fn status(&self) -> &SessionStatus {
    &self.status
  }

  pub fn surface(&self) -> &Surface {
    &self.surface
  }

  pub fn overlay(&self) -> &Overlay {
    &self.overlay
  }

  pub fn current_image(&self) -> Option<&BaseImage> {
    self.image.as_ref()
  }

  pub fn batch(&self) -> Option<&DetectionBatch> {
    self.batch.as_ref()
  }

  /// 替换底图，旧的检测结果失效
  pub fn load_image(&mut self, image: BaseImage) -> Result<ImageId, SessionError> {
    let id = image.id();
    debug!(
      "加载底图 {}: {}x{}",
      id,
      image.natural_width(),
      image.natural_height()
    );
    self.image = Some(image);
    self.batch = None;
    self.status = SessionStatus::Ready;
    self.layout()?;
    Ok(id)
  }

  /// 加载解码结果，解码失败时清空表面并进入失败状态
  pub fn load_decoded<E: std::fmt::Display>(
    &mut self,
    decoded: Result<RgbImage, E>,
  ) -> Result<ImageId, SessionError> {
    let pixels = match decoded {
      Ok(pixels) => pixels,
      Err(e) => {
        let message = format!("图像加载失败: {}", e);
        self.fail(&message);
        return Err(SessionError::Decode(e.to_string()));
      }
    };

    match BaseImage::new(pixels) {
      Ok(image) => self.load_image(image),
      Err(e) => {
        self.fail(&format!("图像加载失败: {}", e));
        Err(e.into())
      }
    }
  }

  /// 容器尺寸变化，重新计算表面并重绘
  pub fn resize(&mut self, container: Container) -> Result<(), SessionError> {
    self.container = container;
    self.layout()
  }

  pub fn set_backing_scale(&mut self, backing_scale: f32) -> Result<(), SessionError> {
    self.backing_scale = backing_scale;
    self.layout()
  }

  /// 为当前底图发起一次检测，返回带标识的输入
  pub fn begin_detect(&self) -> Result<Tagged<BaseImage>, SessionError> {
    let image = self.image.as_ref().ok_or(SessionError::NoImage)?;
    Ok(Tagged::new(image.id(), image.clone()))
  }

  /// 接收推理结果；结果的底图标识与当前底图不一致时丢弃
  pub fn apply_result(
    &mut self,
    result: Tagged<DetectionBatch>,
  ) -> Result<ApplyOutcome, SessionError> {
    let current = self.image.as_ref().map(|image| image.id());
    if current != Some(result.image) {
      info!(
        "丢弃过期的检测结果: 结果属于 {}, 当前底图 {:?}",
        result.image, current
      );
      return Ok(ApplyOutcome::Stale);
    }

    self.batch = Some(result.value);
    let summary = self.repaint()?.unwrap_or_default();
    Ok(ApplyOutcome::Applied(summary))
  }

  /// 进入失败状态：丢弃底图与结果，表面显示占位内容
  pub fn fail(&mut self, message: &str) {
    error!("{}", message);
    self.image = None;
    self.batch = None;
    self.overlay.paint_placeholder(&mut self.surface, message);
    self.status = SessionStatus::Failed(message.to_string());
  }

  pub fn clear(&mut self) {
    self.image = None;
    self.batch = None;
    self.surface.reset();
    self.status = SessionStatus::Empty;
  }

  /// 切换输入模式，清空当前会话内容
  pub fn switch_mode(&mut self, mode: InputMode) {
    if self.mode != mode {
      info!("切换输入模式: {:?} -> {:?}", self.mode, mode);
    }
    self.mode = mode;
    self.clear();
  }

  fn layout(&mut self) -> Result<(), SessionError> {
    let Some(image) = self.image.as_ref() else {
      return Ok(());
    };

    let natural = (image.natural_width(), image.natural_height());
    if self
      .surface
      .resize_for(natural, self.container, self.backing_scale)
      .is_none()
    {
      return Ok(());
    }
    self.repaint()?;
    Ok(())
  }

  /// 用当前底图与当前结果完整重绘；表面尚未布局时返回 None
  fn repaint(&mut self) -> Result<Option<PaintSummary>, SessionError> {
    let Some(image) = self.image.as_ref() else {
      return Ok(None);
    };
    if self.surface.geometry().is_none() {
      debug!("表面尚未布局，推迟绘制");
      return Ok(None);
    }

    let summary = self
      .overlay
      .paint(&mut self.surface, image, self.batch.as_ref())?;
    if summary.skipped > 0 {
      warn!("{} 个检测框被跳过", summary.skipped);
    }
    Ok(Some(summary))
  }
}
