// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{CoordinateSpace, DetectionBatch},
  output::Render,
  surface::Surface,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("显示表面为空，没有可记录的内容")]
  EmptySurface,
}

/// 检测框文本记录，每行 `label, top, left, bottom, right`
pub struct Record;

impl Record {
  pub fn format(batch: &DetectionBatch) -> String {
    let space = match batch.space {
      CoordinateSpace::Normalized { extent } => format!("# normalized {}", extent),
      CoordinateSpace::ImagePixels { width, height } => format!("# pixels {}x{}", width, height),
    };
    let mut lines = vec![space];
    for item in batch.boxes.iter() {
      lines.push(format!(
        "{}, {:.1}, {:.1}, {:.1}, {:.1}",
        item.label, item.top, item.left, item.bottom, item.right
      ));
    }
    lines.join("\n")
  }

  pub fn record(batch: &DetectionBatch, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), Self::format(batch))
  }
}

/// 按日期分目录保存绘制结果
///
/// URL 形如 `folder:///path/to/dir?record&always`：
/// `record` 同时写出检测框文本记录，`always` 在没有检测结果时也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      always,
      frame_counter: AtomicU16::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Surface, DetectionBatch> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Surface, result: &DetectionBatch) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let buffer = frame.buffer();
    if buffer.width() == 0 || buffer.height() == 0 {
      return Err(DirectoryRecordOutputError::EmptySurface);
    }

    let path = self.frame_path(Utc::now())?;
    buffer.save(&path)?;
    if self.record {
      Record::record(result, &path)?;
    }
    debug!("记录帧到: {}", path.display());

    Ok(())
  }
}
