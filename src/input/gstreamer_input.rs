// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! 基于 GStreamer 的视频输入，支持摄像头与视频文件：
//!
//! - `gst://camera/dev/video0?width=640&height=480&fps=15&facing=user`
//! - `gst://file/path/to/video.mp4?rotate=90`
//!
//! 使用前需要安装 GStreamer 开发库（Ubuntu/Debian:
//! `libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev`）。
//!
//! 前置摄像头（`facing=user`）的画面在管道中水平镜像。
//! 视频文件结束（EOS）时迭代结束。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::FacingMode};

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的视频源类型: {0:?}")]
  UnknownSource(Option<String>),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换为 appsink 元素")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
enum PipelineItem {
  FileSource(String),
  CameraSource {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip(&'static str),
  TargetFormat(&'static str),
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => format!("filesrc location={} ! decodebin", path),
      PipelineItem::CameraSource {
        device,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        device, width, height, fps
      ),
      PipelineItem::VideoFlip(method) => format!("videoflip method={}", method),
      PipelineItem::TargetFormat(format) => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<PipelineItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = match url.host_str() {
      Some("camera") => vec![PipelineItem::CameraSource {
        device: url.path().to_string(),
        width: parse("width", DEFAULT_CAMERA_WIDTH),
        height: parse("height", DEFAULT_CAMERA_HEIGHT),
        fps: parse("fps", DEFAULT_CAMERA_FPS),
      }],
      Some("file") => vec![PipelineItem::FileSource(url.path().to_string())],
      other => return Err(GStreamerInputError::UnknownSource(other.map(String::from))),
    };

    if let Some(flip) = Self::rotation(query.get("rotate").map(String::as_str)) {
      items.push(flip);
    }
    if FacingMode::from_query(query.get("facing").map(String::as_str)) == FacingMode::User {
      items.push(PipelineItem::VideoFlip("horizontal-flip"));
    }
    items.push(PipelineItem::TargetFormat("RGB"));

    Ok(GStreamerInputPipelineBuilder { items })
  }
}

impl GStreamerInputPipelineBuilder {
  fn rotation(rotate: Option<&str>) -> Option<PipelineItem> {
    let method = match rotate? {
      "90" => "clockwise",
      "180" => "rotate-180",
      "270" => "counterclockwise",
      _ => return None,
    };
    Some(PipelineItem::VideoFlip(method))
  }

  /// 管道以视频文件为源
  pub fn is_file(&self) -> bool {
    matches!(self.items.first(), Some(PipelineItem::FileSource(_)))
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = self.description();
    let is_file = self.is_file();
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      is_file,
    })
  }
}

/// GStreamer 视频输入，逐帧产生 RGB 图像
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  is_file: bool,
}

impl GStreamerInput {
  /// 帧来自视频文件而非摄像头
  pub fn is_file(&self) -> bool {
    self.is_file
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<RgbImage, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(convert_sample(&sample)),
      Err(_) if self.appsink.is_eos() => {
        info!("视频源结束");
        None
      }
      Err(e) => Some(Err(GStreamerInputError::PipelineError(format!(
        "获取帧失败: {}",
        e
      )))),
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("sample 中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("sample 中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  let swap = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;

  pack_rgb_rows(map.as_slice(), width, height, stride, swap)
}

/// 把带行填充的 RGB/BGR 数据整理为紧凑的 RGB 图像
fn pack_rgb_rows(
  data: &[u8],
  width: usize,
  height: usize,
  stride: usize,
  swap: bool,
) -> Result<RgbImage, GStreamerInputError> {
  let expected = stride * height.saturating_sub(1) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let line = &data[row * stride..row * stride + width * 3];
    if swap {
      for bgr in line.chunks_exact(3) {
        pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
      }
    } else {
      pixels.extend_from_slice(line);
    }
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or_else(|| GStreamerInputError::PipelineError("帧尺寸与数据不一致".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn description(url: &str) -> String {
    GStreamerInputPipelineBuilder::from_url(&Url::parse(url).unwrap())
      .unwrap()
      .description()
  }

  #[test]
  fn user_facing_camera_is_mirrored() {
    assert_eq!(
      description("gst://camera/dev/video0?width=1280&height=720&facing=user"),
      "v4l2src device=/dev/video0 ! video/x-raw,width=1280,height=720,framerate=15/1 ! \
       videoflip method=horizontal-flip ! videoconvert ! video/x-raw,format=RGB ! \
       appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn file_source_with_rotation() {
    assert_eq!(
      description("gst://file/data/field.mp4?rotate=180"),
      "filesrc location=/data/field.mp4 ! decodebin ! videoflip method=rotate-180 ! \
       videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn unknown_source_is_rejected() {
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&Url::parse("gst://rtsp/stream").unwrap()),
      Err(GStreamerInputError::UnknownSource(Some(_)))
    ));
  }

  #[test]
  fn file_and_camera_sources_are_told_apart() {
    let builder =
      |url: &str| GStreamerInputPipelineBuilder::from_url(&Url::parse(url).unwrap()).unwrap();
    assert!(builder("gst://file/data/field.mp4").is_file());
    assert!(!builder("gst://camera/dev/video0?facing=user").is_file());
  }

  #[test]
  fn row_padding_is_dropped() {
    // 2x2 RGB，每行 8 字节，末尾 2 字节为填充
    let data = [
      1, 2, 3, 4, 5, 6, 99, 99, //
      7, 8, 9, 10, 11, 12,
    ];
    let image = pack_rgb_rows(&data, 2, 2, 8, false).unwrap();
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(image.as_raw(), &vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
  }

  #[test]
  fn bgr_rows_are_swapped() {
    let data = [30, 20, 10, 0, 0, 255, 0, 0];
    let image = pack_rgb_rows(&data, 2, 1, 8, true).unwrap();
    assert_eq!(image.get_pixel(0, 0), &image::Rgb([10, 20, 30]));
    assert_eq!(image.get_pixel(1, 0), &image::Rgb([255, 0, 0]));
  }

  #[test]
  fn short_buffer_is_rejected() {
    assert!(matches!(
      pack_rgb_rows(&[0; 10], 2, 2, 8, false),
      Err(GStreamerInputError::BufferSizeMismatch {
        expected: 14,
        actual: 10
      })
    ));
  }
}
