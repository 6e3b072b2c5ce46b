// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/input/image_directory.rs - 图像目录作为帧序列
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

use std::{collections::VecDeque, path::PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use super::read_image_file::{ImageFileInputError, decode_image_file};
use crate::{FromUrl, FromUrlWithScheme, frame::FacingMode};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像帧: {0}")]
  NoFrames(String),
  #[error("帧解码错误: {0}")]
  FrameError(#[from] ImageFileInputError),
}

/// 按文件名顺序把目录中的图像当作视频帧
///
/// URL 形如 `frames:///path/to/dir?facing=user`。
pub struct ImageDirectoryInput {
  frames: VecDeque<PathBuf>,
  facing: FacingMode,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }

    let facing = FacingMode::from_query(
      url
        .query_pairs()
        .find(|(k, _)| k == "facing")
        .map(|(_, v)| v.into_owned())
        .as_deref(),
    );

    let mut frames = Vec::new();
    for entry in std::fs::read_dir(url.path())? {
      let path = entry?.path();
      let is_frame = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
      if path.is_file() && is_frame {
        frames.push(path);
      }
    }
    if frames.is_empty() {
      return Err(ImageDirectoryInputError::NoFrames(url.path().to_string()));
    }
    frames.sort();
    info!("从 {} 读取 {} 帧, 朝向 {:?}", url.path(), frames.len(), facing);

    Ok(ImageDirectoryInput {
      frames: frames.into(),
      facing,
    })
  }
}

impl ImageDirectoryInput {
  pub fn remaining(&self) -> usize {
    self.frames.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<RgbImage, ImageDirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.frames.pop_front()?;
    Some(
      decode_image_file(&path)
        .map(|frame| self.facing.capture(frame))
        .map_err(ImageDirectoryInputError::from),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn frames_follow_file_name_order_and_facing() {
    let dir = std::env::temp_dir().join(format!("chongjian-frames-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
      let mut frame = RgbImage::from_pixel(2, 1, Rgb([value, 0, 0]));
      frame.put_pixel(1, 0, Rgb([0, 0, 255]));
      frame.save(dir.join(name)).unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let url = Url::parse(&format!("frames://{}?facing=user", dir.display())).unwrap();
    let input = ImageDirectoryInput::from_url(&url).unwrap();
    assert_eq!(input.remaining(), 3);

    let frames: Vec<RgbImage> = input.map(|f| f.unwrap()).collect();
    let firsts: Vec<u8> = frames.iter().map(|f| f.get_pixel(1, 0)[0]).collect();
    assert_eq!(firsts, vec![10, 20, 30]);
    assert_eq!(frames[0].get_pixel(0, 0), &Rgb([0, 0, 255]));

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn empty_directory_is_rejected() {
    let dir = std::env::temp_dir().join(format!("chongjian-noframes-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let url = Url::parse(&format!("frames://{}", dir.display())).unwrap();
    assert!(matches!(
      ImageDirectoryInput::from_url(&url),
      Err(ImageDirectoryInputError::NoFrames(_))
    ));

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
