// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/frame.rs - 底图帧定义
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

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use image::RgbImage;
use thiserror::Error;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 底图标识，每次解码得到的新图像都拥有不同的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

impl ImageId {
  fn next() -> Self {
    ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl std::fmt::Display for ImageId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// 当前显示的底图，整体替换，不在原地修改
#[derive(Debug, Clone)]
pub struct BaseImage {
  id: ImageId,
  pixels: Arc<RgbImage>,
}

impl BaseImage {
  pub fn new(pixels: RgbImage) -> Result<Self, FrameError> {
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyImage(width, height));
    }

    Ok(Self {
      id: ImageId::next(),
      pixels: Arc::new(pixels),
    })
  }

  pub fn id(&self) -> ImageId {
    self.id
  }

  pub fn natural_width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn natural_height(&self) -> u32 {
    self.pixels.height()
  }

  pub fn pixels(&self) -> &RgbImage {
    &self.pixels
  }
}

/// 带有底图标识的异步结果
#[derive(Debug, Clone)]
pub struct Tagged<T> {
  pub image: ImageId,
  pub value: T,
}

impl<T> Tagged<T> {
  pub fn new(image: ImageId, value: T) -> Self {
    Self { image, value }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tagged<U> {
    Tagged {
      image: self.image,
      value: f(self.value),
    }
  }
}

/// 摄像头朝向，前置摄像头的画面需要水平镜像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
  User,
  #[default]
  Environment,
}

impl FacingMode {
  pub fn from_query(value: Option<&str>) -> Self {
    match value {
      Some("user") => FacingMode::User,
      _ => FacingMode::Environment,
    }
  }

  pub fn capture(&self, frame: RgbImage) -> RgbImage {
    match self {
      FacingMode::User => image::imageops::flip_horizontal(&frame),
      FacingMode::Environment => frame,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn base_image_ids_are_unique() {
    let a = BaseImage::new(RgbImage::new(4, 4)).unwrap();
    let b = BaseImage::new(RgbImage::new(4, 4)).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.id(), a.clone().id());
  }

  #[test]
  fn empty_image_is_rejected() {
    assert!(matches!(
      BaseImage::new(RgbImage::new(0, 3)),
      Err(FrameError::EmptyImage(0, 3))
    ));
  }

  #[test]
  fn user_facing_capture_is_mirrored() {
    let mut frame = RgbImage::new(2, 1);
    frame.put_pixel(0, 0, Rgb([255, 0, 0]));
    let mirrored = FacingMode::User.capture(frame.clone());
    assert_eq!(mirrored.get_pixel(1, 0), &Rgb([255, 0, 0]));
    let kept = FacingMode::Environment.capture(frame);
    assert_eq!(kept.get_pixel(0, 0), &Rgb([255, 0, 0]));
  }
}
