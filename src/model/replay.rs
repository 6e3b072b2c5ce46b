// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/model/replay.rs - 回放已保存的检测响应
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
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::BaseImage,
  model::{
    CoordinateSpace, DetectionBatch, DetectionBox, Model, NORMALIZED_EXTENT, parse_box_response,
  },
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("缺少坐标空间参数 space（normalized 或 pixels）")]
  MissingSpace,
  #[error("未知的坐标空间: {0}")]
  UnknownSpace(String),
  #[error("无效的归一化范围: {0}")]
  InvalidExtent(String),
}

/// 回放结果的坐标空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplaySpace {
  /// 固定的坐标空间
  Fixed(CoordinateSpace),
  /// 使用推理输入图像的像素坐标
  ImagePixels,
}

impl ReplaySpace {
  fn from_query(url: &Url) -> Result<Self, ReplayModelError> {
    let mut space = None;
    let mut extent = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "space" => space = Some(v.into_owned()),
        "extent" => extent = Some(v.into_owned()),
        _ => {}
      }
    }

    match space.as_deref() {
      Some("normalized") => {
        let extent = match extent {
          Some(raw) => raw
            .parse::<f32>()
            .ok()
            .filter(|e| e.is_finite() && *e > 0.0)
            .ok_or(ReplayModelError::InvalidExtent(raw))?,
          None => NORMALIZED_EXTENT,
        };
        Ok(ReplaySpace::Fixed(CoordinateSpace::Normalized { extent }))
      }
      Some("pixels") => Ok(ReplaySpace::ImagePixels),
      Some(other) => Err(ReplayModelError::UnknownSpace(other.to_string())),
      None => Err(ReplayModelError::MissingSpace),
    }
  }

  fn resolve(&self, image: &BaseImage) -> CoordinateSpace {
    match self {
      ReplaySpace::Fixed(space) => *space,
      ReplaySpace::ImagePixels => CoordinateSpace::image_pixels(image),
    }
  }
}

/// 对每一帧都返回同一份保存下来的检测响应
///
/// URL 形如 `replay:///path/to/response.txt?space=normalized`，
/// 文件内容可以是模型原始文本响应，也可以是存储格式的 JSON 数组。
#[derive(Debug, Clone)]
pub struct ReplayModel {
  space: ReplaySpace,
  boxes: Vec<DetectionBox>,
}

impl ReplayModel {
  pub fn new(space: ReplaySpace, boxes: Vec<DetectionBox>) -> Self {
    Self { space, boxes }
  }

  pub fn from_response(space: ReplaySpace, text: &str) -> Self {
    Self::new(space, parse_box_response(text))
  }
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let space = ReplaySpace::from_query(url)?;
    info!("加载检测响应文件: {}", url.path());
    let text = std::fs::read_to_string(url.path())?;
    let model = Self::from_response(space, &text);
    debug!("检测响应包含 {} 个检测框, 坐标空间 {:?}", model.boxes.len(), space);
    Ok(model)
  }
}

impl Model for ReplayModel {
  type Input = BaseImage;
  type Output = DetectionBatch;
  type Error = ReplayModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(DetectionBatch::new(
      self.space.resolve(input),
      self.boxes.clone(),
    ))
  }
}
