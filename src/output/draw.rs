// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/output/draw.rs - 检测结果叠加绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{GenericImage, Rgb, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::BaseImage,
  model::DetectionBatch,
  normalize::{LogicalRect, Normalizer},
  surface::{DisplaySurface, Surface},
};

// 绘制常量（逻辑像素）
const STROKE_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const STROKE_WIDTH_BASE: f32 = 2.0;
const FONT_SIZE_BASE: f32 = 14.0;
const LABEL_PADDING: f32 = 4.0;
const LABEL_BACKGROUND_COLOR: [u8; 3] = [255, 0, 0];
const LABEL_BACKGROUND_ALPHA: f32 = 0.7;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色文本
const LABEL_CHAR_WIDTH_RATIO: f32 = 0.6; // 无字体时每字符平均宽度与字号之比（粗略估计）
const PLACEHOLDER_COLOR: [u8; 3] = [32, 32, 32];
const BASE_IMAGE_FILTER: FilterType = FilterType::Triangle;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("显示表面尚未布局")]
  SurfaceNotReady,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 标签背景与文本的位置（逻辑像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
  pub background: LogicalRect,
  pub text_x: f32,
  pub text_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaintSummary {
  pub drawn: usize,
  pub skipped: usize,
}

/// 叠加绘制器
///
/// 每次绘制都完整清空并重绘缓冲区，相同输入得到逐像素相同的结果。
#[derive(Clone, Default)]
pub struct Overlay {
  font: Option<FontArc>,
  normalizer: Normalizer,
}

impl Overlay {
  pub fn new(normalizer: Normalizer) -> Self {
    Self {
      font: None,
      normalizer,
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, DrawError> {
    let data = std::fs::read(path)?;
    Ok(FontArc::try_from_vec(data)?)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn normalizer(&self) -> &Normalizer {
    &self.normalizer
  }

  pub fn stroke_width(geometry: &DisplaySurface) -> f32 {
    STROKE_WIDTH_BASE.max(STROKE_WIDTH_BASE * geometry.backing_scale)
  }

  /// 字号随像素密度放大，保证高密度屏幕上标签可读
  pub fn font_size(geometry: &DisplaySurface) -> f32 {
    FONT_SIZE_BASE.max(FONT_SIZE_BASE * geometry.backing_scale)
  }

  /// 标签文本宽度（逻辑像素）
  pub fn measure_label(&self, label: &str, font_size: f32, geometry: &DisplaySurface) -> f32 {
    match &self.font {
      Some(font) => {
        let scale = PxScale::from(geometry.to_backing(font_size));
        let (width, _) = text_size(scale, font, label);
        width as f32 / geometry.backing_scale
      }
      None => label.chars().count() as f32 * font_size * LABEL_CHAR_WIDTH_RATIO,
    }
  }

  /// 标签优先放在框的上方；上方空间不足时放在框的下方，
  /// 上下都放不下时放在框内顶部。
  ///
  /// 因此顶边贴着表面顶部且高度占满表面的框，标签在框内而不在框下方；
  /// 只有这种情况不遵守“顶部放不下就放下方”的规则。
  pub fn place_label(
    rect: &LogicalRect,
    text_width: f32,
    font_size: f32,
    geometry: &DisplaySurface,
  ) -> LabelPlacement {
    let width = text_width + LABEL_PADDING;
    let height = font_size + LABEL_PADDING;

    let y = if rect.y >= height {
      rect.y - height
    } else if rect.bottom() + height <= geometry.logical_height {
      rect.bottom()
    } else {
      rect.y
    };
    let x = rect.x.min(geometry.logical_width - width).max(0.0);

    LabelPlacement {
      background: LogicalRect {
        x,
        y,
        width,
        height,
      },
      text_x: x + LABEL_PADDING / 2.0,
      text_y: y + LABEL_PADDING / 2.0,
    }
  }

  /// 清空缓冲区，绘制拉伸到逻辑尺寸的底图，再绘制每个检测框与标签
  pub fn paint(
    &self,
    surface: &mut Surface,
    image: &BaseImage,
    batch: Option<&DetectionBatch>,
  ) -> Result<PaintSummary, DrawError> {
    let geometry = surface.geometry().ok_or(DrawError::SurfaceNotReady)?;
    surface.clear();

    let (width, height) = geometry.backing_size();
    let scaled = image::imageops::resize(image.pixels(), width, height, BASE_IMAGE_FILTER);
    surface.buffer_mut().copy_from(&scaled, 0, 0)?;

    let Some(batch) = batch else {
      return Ok(PaintSummary::default());
    };

    let (rects, skipped) = self.normalizer.normalize_batch(batch, &geometry);
    let stroke_width = Self::stroke_width(&geometry);
    let font_size = Self::font_size(&geometry);
    let buffer = surface.buffer_mut();

    for (rect, label) in rects.iter() {
      stroke_rect(buffer, &geometry, rect, stroke_width);

      let text_width = self.measure_label(label, font_size, &geometry);
      let placement = Self::place_label(rect, text_width, font_size, &geometry);
      fill_rect_blended(
        buffer,
        &geometry,
        &placement.background,
        LABEL_BACKGROUND_COLOR,
        LABEL_BACKGROUND_ALPHA,
      );

      if let Some(font) = &self.font {
        draw_text_mut(
          buffer,
          Rgb(LABEL_TEXT_COLOR),
          geometry.to_backing(placement.text_x).round() as i32,
          geometry.to_backing(placement.text_y).round() as i32,
          PxScale::from(geometry.to_backing(font_size)),
          font,
          label,
        );
      }
    }

    debug!("绘制 {} 个检测框, 跳过 {} 个", rects.len(), skipped);
    Ok(PaintSummary {
      drawn: rects.len(),
      skipped,
    })
  }

  /// 失败时清空表面并显示占位内容
  pub fn paint_placeholder(&self, surface: &mut Surface, message: &str) {
    let Some(geometry) = surface.geometry() else {
      surface.reset();
      return;
    };

    let buffer = surface.buffer_mut();
    for pixel in buffer.pixels_mut() {
      *pixel = Rgb(PLACEHOLDER_COLOR);
    }

    if let Some(font) = &self.font {
      let font_size = Self::font_size(&geometry);
      draw_text_mut(
        buffer,
        Rgb(LABEL_TEXT_COLOR),
        geometry.to_backing(LABEL_PADDING).round() as i32,
        geometry.to_backing(LABEL_PADDING).round() as i32,
        PxScale::from(geometry.to_backing(font_size)),
        font,
        message,
      );
    }
  }
}

// 逻辑矩形变换到缓冲区像素，并裁剪到缓冲区内
fn backing_rect(geometry: &DisplaySurface, rect: &LogicalRect) -> Option<Rect> {
  let (width, height) = geometry.backing_size();
  let (width, height) = (width as f32, height as f32);

  let x0 = geometry.to_backing(rect.x).floor().clamp(0.0, width);
  let y0 = geometry.to_backing(rect.y).floor().clamp(0.0, height);
  let x1 = geometry.to_backing(rect.right()).ceil().clamp(0.0, width);
  let y1 = geometry.to_backing(rect.bottom()).ceil().clamp(0.0, height);

  if x1 <= x0 || y1 <= y0 {
    return None;
  }

  Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

fn stroke_rect(image: &mut RgbImage, geometry: &DisplaySurface, rect: &LogicalRect, stroke_width: f32) {
  let Some(outer) = backing_rect(geometry, rect) else {
    return;
  };

  // 边框向内加粗
  let thickness = geometry.to_backing(stroke_width).round().max(1.0) as u32;
  for t in 0..thickness {
    let (w, h) = (outer.width(), outer.height());
    if w <= 2 * t || h <= 2 * t {
      break;
    }
    let inner = Rect::at(outer.left() + t as i32, outer.top() + t as i32).of_size(w - 2 * t, h - 2 * t);
    draw_hollow_rect_mut(image, inner, Rgb(STROKE_COLOR));
  }
}

fn fill_rect_blended(
  image: &mut RgbImage,
  geometry: &DisplaySurface,
  rect: &LogicalRect,
  color: [u8; 3],
  alpha: f32,
) {
  let Some(area) = backing_rect(geometry, rect) else {
    return;
  };

  let x_end = (area.left() as u32 + area.width()).min(image.width());
  let y_end = (area.top() as u32 + area.height()).min(image.height());
  for y in area.top() as u32..y_end {
    for x in area.left() as u32..x_end {
      let pixel = image.get_pixel_mut(x, y);
      for c in 0..3 {
        let blended = pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
        pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
      }
    }
  }
}
