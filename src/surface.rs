// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/surface.rs - 显示表面尺寸计算
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

use image::{Rgb, RgbImage};
use tracing::debug;

const CLEAR_COLOR: [u8; 3] = [0, 0, 0];

/// 容器可用空间（逻辑像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Container {
  pub width: f32,
  pub height: f32,
}

impl Container {
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  pub fn has_area(&self) -> bool {
    self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
  }
}

/// 在保持宽高比的前提下，把图像放进容器
///
/// 宽度检查做两次：高度约束缩放之后可能再次超出宽度。
/// 容器没有面积（尚未布局）时返回 `None`，调用方在下一次布局事件时重试。
pub fn fit_within(natural_width: f32, natural_height: f32, container: Container) -> Option<(f32, f32)> {
  if !container.has_area() || natural_width <= 0.0 || natural_height <= 0.0 {
    return None;
  }

  let aspect_ratio = natural_width / natural_height;
  let (mut width, mut height) = (natural_width, natural_height);

  if width > container.width {
    width = container.width;
    height = width / aspect_ratio;
  }
  if height > container.height {
    height = container.height;
    width = height * aspect_ratio;
  }
  if width > container.width {
    width = container.width;
    height = width / aspect_ratio;
  }

  Some((width, height))
}

/// 非法的像素密度按 1 处理
pub fn sanitize_backing_scale(backing_scale: f32) -> f32 {
  if backing_scale.is_finite() && backing_scale > 0.0 {
    backing_scale
  } else {
    1.0
  }
}

/// 显示表面当前几何信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySurface {
  pub logical_width: f32,
  pub logical_height: f32,
  /// 只作用于像素缓冲区，不参与坐标缩放计算
  pub backing_scale: f32,
}

impl DisplaySurface {
  pub fn backing_size(&self) -> (u32, u32) {
    (
      (self.logical_width * self.backing_scale).round().max(1.0) as u32,
      (self.logical_height * self.backing_scale).round().max(1.0) as u32,
    )
  }

  /// 逻辑单位到缓冲区像素的缩放变换
  pub fn to_backing(&self, value: f32) -> f32 {
    value * self.backing_scale
  }
}

/// 绘制目标：几何信息加上实际像素缓冲区
#[derive(Debug, Clone)]
pub struct Surface {
  geometry: Option<DisplaySurface>,
  buffer: RgbImage,
}

impl Default for Surface {
  fn default() -> Self {
    Self::new()
  }
}

impl Surface {
  pub fn new() -> Self {
    Self {
      geometry: None,
      buffer: RgbImage::new(0, 0),
    }
  }

  pub fn geometry(&self) -> Option<DisplaySurface> {
    self.geometry
  }

  pub fn buffer(&self) -> &RgbImage {
    &self.buffer
  }

  pub(crate) fn buffer_mut(&mut self) -> &mut RgbImage {
    &mut self.buffer
  }

  /// 按底图自然尺寸与容器重新计算表面，并把缓冲区设为逻辑尺寸乘以像素密度
  pub fn resize_for(
    &mut self,
    natural: (u32, u32),
    container: Container,
    backing_scale: f32,
  ) -> Option<DisplaySurface> {
    let Some((logical_width, logical_height)) =
      fit_within(natural.0 as f32, natural.1 as f32, container)
    else {
      debug!(
        "容器尚未布局 ({}x{})，推迟表面尺寸计算",
        container.width, container.height
      );
      return None;
    };

    let geometry = DisplaySurface {
      logical_width,
      logical_height,
      backing_scale: sanitize_backing_scale(backing_scale),
    };
    let (width, height) = geometry.backing_size();
    if self.buffer.dimensions() != (width, height) {
      self.buffer = RgbImage::new(width, height);
    }
    self.geometry = Some(geometry);

    debug!(
      "表面尺寸: {}x{} (逻辑), {}x{} (缓冲区)",
      logical_width, logical_height, width, height
    );
    Some(geometry)
  }

  pub fn clear(&mut self) {
    for pixel in self.buffer.pixels_mut() {
      *pixel = Rgb(CLEAR_COLOR);
    }
  }

  /// 清除底图后销毁几何信息与缓冲区
  pub fn reset(&mut self) {
    self.geometry = None;
    self.buffer = RgbImage::new(0, 0);
  }
}
