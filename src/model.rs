// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/model.rs - 检测结果与模型
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

use serde::{Deserialize, Serialize};

use crate::frame::BaseImage;

/// 生成式视觉模型返回坐标的归一化范围
pub const NORMALIZED_EXTENT: f32 = 1000.0;

/// 外部推理调用，每次调用只产生一个结果或一个错误
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (*self).infer(input)
  }
}

/// 一个检测区域，坐标处于产生它的接口的原生坐标空间
///
/// 存储的检测记录使用 `xmin/ymin/xmax/ymax` 字段名，反序列化时同样接受。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
  #[serde(alias = "ymin")]
  pub top: f32,
  #[serde(alias = "xmin")]
  pub left: f32,
  #[serde(alias = "ymax")]
  pub bottom: f32,
  #[serde(alias = "xmax")]
  pub right: f32,
  pub label: String,
}

impl DetectionBox {
  pub fn new(top: f32, left: f32, bottom: f32, right: f32, label: impl Into<String>) -> Self {
    Self {
      top,
      left,
      bottom,
      right,
      label: label.into(),
    }
  }
}

/// 原生坐标空间，随每一批检测结果携带，不做全局假设
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSpace {
  /// 两个轴都归一化到 `[0, extent]`
  Normalized { extent: f32 },
  /// 源图像的像素坐标
  ImagePixels { width: f32, height: f32 },
}

impl CoordinateSpace {
  pub fn normalized() -> Self {
    CoordinateSpace::Normalized {
      extent: NORMALIZED_EXTENT,
    }
  }

  pub fn image_pixels(image: &BaseImage) -> Self {
    CoordinateSpace::ImagePixels {
      width: image.natural_width() as f32,
      height: image.natural_height() as f32,
    }
  }

  /// (x 轴范围, y 轴范围)
  pub fn extent(&self) -> (f32, f32) {
    match *self {
      CoordinateSpace::Normalized { extent } => (extent, extent),
      CoordinateSpace::ImagePixels { width, height } => (width, height),
    }
  }
}

/// 一次推理调用的全部检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBatch {
  pub space: CoordinateSpace,
  pub boxes: Vec<DetectionBox>,
}

impl DetectionBatch {
  pub fn new(space: CoordinateSpace, boxes: Vec<DetectionBox>) -> Self {
    Self { space, boxes }
  }

  pub fn empty(space: CoordinateSpace) -> Self {
    Self {
      space,
      boxes: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }
}

pub mod response;
pub use self::response::parse_box_response;

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError, ReplaySpace};
