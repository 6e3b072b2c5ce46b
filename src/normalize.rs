// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/normalize.rs - 检测框坐标归一化
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

use thiserror::Error;
use tracing::warn;

use crate::{
  model::{CoordinateSpace, DetectionBatch, DetectionBox},
  surface::DisplaySurface,
};

/// 逻辑像素下的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl LogicalRect {
  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }
}

/// 被跳过的检测框，属于可恢复的数据质量问题
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoxRejection {
  #[error("坐标不是有限数值")]
  NonFinite,
  #[error("标签为空")]
  EmptyLabel,
  #[error("退化的检测框: right <= left 或 bottom <= top")]
  Degenerate,
  #[error("检测框超出原生坐标范围 {extent_x}x{extent_y}")]
  OutOfRange { extent_x: f32, extent_y: f32 },
  #[error("坐标空间范围无效")]
  InvalidSpace,
}

/// 超出原生坐标范围的检测框如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfRangePolicy {
  #[default]
  Discard,
  /// 裁剪到范围内，裁剪后退化的检测框仍然跳过
  Clamp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
  policy: OutOfRangePolicy,
}

impl Normalizer {
  pub fn new(policy: OutOfRangePolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> OutOfRangePolicy {
    self.policy
  }

  /// 把原生坐标空间中的检测框映射到显示表面的逻辑像素
  pub fn normalize(
    &self,
    detection: &DetectionBox,
    space: CoordinateSpace,
    surface: &DisplaySurface,
  ) -> Result<LogicalRect, BoxRejection> {
    let DetectionBox {
      top,
      left,
      bottom,
      right,
      ref label,
    } = *detection;

    if ![top, left, bottom, right].iter().all(|v| v.is_finite()) {
      return Err(BoxRejection::NonFinite);
    }
    if label.trim().is_empty() {
      return Err(BoxRejection::EmptyLabel);
    }
    if right <= left || bottom <= top {
      return Err(BoxRejection::Degenerate);
    }

    let (extent_x, extent_y) = space.extent();
    if !(extent_x.is_finite() && extent_y.is_finite() && extent_x > 0.0 && extent_y > 0.0) {
      return Err(BoxRejection::InvalidSpace);
    }

    let inside = left >= 0.0 && top >= 0.0 && right <= extent_x && bottom <= extent_y;
    let (top, left, bottom, right) = match (inside, self.policy) {
      (true, _) => (top, left, bottom, right),
      (false, OutOfRangePolicy::Discard) => {
        return Err(BoxRejection::OutOfRange { extent_x, extent_y });
      }
      (false, OutOfRangePolicy::Clamp) => {
        let clamped = (
          top.clamp(0.0, extent_y),
          left.clamp(0.0, extent_x),
          bottom.clamp(0.0, extent_y),
          right.clamp(0.0, extent_x),
        );
        if clamped.3 <= clamped.1 || clamped.2 <= clamped.0 {
          return Err(BoxRejection::Degenerate);
        }
        clamped
      }
    };

    let scale_x = surface.logical_width / extent_x;
    let scale_y = surface.logical_height / extent_y;

    // 浮点误差不能把边缘推出表面
    let x = (left * scale_x).min(surface.logical_width);
    let y = (top * scale_y).min(surface.logical_height);
    let x_max = (right * scale_x).min(surface.logical_width);
    let y_max = (bottom * scale_y).min(surface.logical_height);

    Ok(LogicalRect {
      x,
      y,
      width: x_max - x,
      height: y_max - y,
    })
  }

  /// 归一化整批检测框，跳过有问题的检测框并继续处理剩余部分
  pub fn normalize_batch<'b>(
    &self,
    batch: &'b DetectionBatch,
    surface: &DisplaySurface,
  ) -> (Vec<(LogicalRect, &'b str)>, usize) {
    let mut skipped = 0;
    let rects = batch
      .boxes
      .iter()
      .filter_map(
        |detection| match self.normalize(detection, batch.space, surface) {
          Ok(rect) => Some((rect, detection.label.as_str())),
          Err(e) => {
            warn!("跳过检测框 {:?}: {}", detection, e);
            skipped += 1;
            None
          }
        },
      )
      .collect();
    (rects, skipped)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn surface(w: f32, h: f32) -> DisplaySurface {
    DisplaySurface {
      logical_width: w,
      logical_height: h,
      backing_scale: 1.0,
    }
  }

  #[test]
  fn normalized_aphid_box_on_500_surface() {
    let detection = DetectionBox::new(80.0, 120.0, 350.0, 400.0, "aphid");
    let rect = Normalizer::default()
      .normalize(&detection, CoordinateSpace::normalized(), &surface(500.0, 500.0))
      .unwrap();
    assert_eq!(
      rect,
      LogicalRect {
        x: 60.0,
        y: 40.0,
        width: 140.0,
        height: 135.0
      }
    );
  }

  #[test]
  fn pixel_space_scales_per_axis() {
    let space = CoordinateSpace::ImagePixels {
      width: 2000.0,
      height: 1000.0,
    };
    let detection = DetectionBox::new(100.0, 200.0, 500.0, 1000.0, "rust");
    let rect = Normalizer::default()
      .normalize(&detection, space, &surface(500.0, 250.0))
      .unwrap();
    assert_eq!(rect.x, 50.0);
    assert_eq!(rect.y, 25.0);
    assert_eq!(rect.width, 200.0);
    assert_eq!(rect.height, 100.0);
  }

  #[test]
  fn boxes_inside_extent_stay_on_surface() {
    let normalizer = Normalizer::default();
    let surfaces = [surface(333.3, 777.7), surface(1.0, 1.0), surface(1919.9, 1080.1)];
    let steps = [0.0, 0.1, 123.4, 499.9, 999.9, 1000.0];
    for s in surfaces {
      for &top in &steps {
        for &left in &steps {
          for &bottom in &steps {
            for &right in &steps {
              let detection = DetectionBox::new(top, left, bottom, right, "mite");
              if let Ok(rect) = normalizer.normalize(&detection, CoordinateSpace::normalized(), &s) {
                assert!(rect.x >= 0.0 && rect.y >= 0.0);
                assert!(rect.width >= 0.0 && rect.height >= 0.0);
                assert!(rect.right() <= s.logical_width + 1e-3);
                assert!(rect.bottom() <= s.logical_height + 1e-3);
              }
            }
          }
        }
      }
    }
  }

  #[test]
  fn rejects_bad_boxes() {
    let normalizer = Normalizer::default();
    let space = CoordinateSpace::normalized();
    let s = surface(100.0, 100.0);
    let reject = |d: DetectionBox| normalizer.normalize(&d, space, &s).unwrap_err();

    assert_eq!(reject(DetectionBox::new(10.0, 10.0, 10.0, 20.0, "a")), BoxRejection::Degenerate);
    assert_eq!(reject(DetectionBox::new(10.0, 30.0, 20.0, 20.0, "a")), BoxRejection::Degenerate);
    assert_eq!(reject(DetectionBox::new(10.0, 10.0, 20.0, 20.0, "  ")), BoxRejection::EmptyLabel);
    assert_eq!(reject(DetectionBox::new(f32::NAN, 10.0, 20.0, 20.0, "a")), BoxRejection::NonFinite);
    assert!(matches!(
      reject(DetectionBox::new(10.0, 10.0, 1200.0, 20.0, "a")),
      BoxRejection::OutOfRange { .. }
    ));
  }

  #[test]
  fn clamp_policy_keeps_partially_outside_boxes() {
    let normalizer = Normalizer::new(OutOfRangePolicy::Clamp);
    let space = CoordinateSpace::normalized();
    let s = surface(500.0, 500.0);
    let rect = normalizer
      .normalize(&DetectionBox::new(-50.0, 900.0, 500.0, 1100.0, "a"), space, &s)
      .unwrap();
    assert_eq!(rect, LogicalRect { x: 450.0, y: 0.0, width: 50.0, height: 250.0 });

    assert_eq!(
      normalizer
        .normalize(&DetectionBox::new(10.0, 1100.0, 20.0, 1200.0, "a"), space, &s)
        .unwrap_err(),
      BoxRejection::Degenerate
    );
  }

  #[test]
  fn batch_skips_and_continues() {
    let batch = DetectionBatch::new(
      CoordinateSpace::normalized(),
      vec![
        DetectionBox::new(0.0, 0.0, 100.0, 100.0, "aphid"),
        DetectionBox::new(0.0, 0.0, 0.0, 100.0, "flat"),
        DetectionBox::new(0.0, 0.0, 100.0, 100.0, ""),
        DetectionBox::new(500.0, 500.0, 600.0, 600.0, "thrips"),
      ],
    );
    let (rects, skipped) = Normalizer::default().normalize_batch(&batch, &surface(10.0, 10.0));
    assert_eq!(skipped, 2);
    assert_eq!(rects.len(), 2);
    assert_eq!(rects[0].1, "aphid");
    assert_eq!(rects[1].1, "thrips");
  }
}
