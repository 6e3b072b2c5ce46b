// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续检测
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

use std::{path::PathBuf, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use url::Url;

use chongjian::{
  FromUrl,
  input::InputWrapper,
  model::ReplayModel,
  normalize::{Normalizer, OutOfRangePolicy},
  output::{OutputWrapper, draw::Overlay},
  session::DetectionSession,
  surface::Container,
  task::FrameLoop,
};
use tracing::{info, warn};

/// 连续检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测结果来源，如 replay:///path/response.txt?space=normalized
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 两次迭代之间的等待时间（毫秒）
  #[arg(long, default_value_t = 16)]
  pub frame_interval_ms: u64,

  /// 显示容器宽度（逻辑像素）
  #[arg(long, default_value_t = 800.0)]
  pub width: f32,
  /// 显示容器高度（逻辑像素）
  #[arg(long, default_value_t = 600.0)]
  pub height: f32,
  #[arg(long, default_value_t = 1.0)]
  pub backing_scale: f32,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  #[arg(long)]
  pub clamp: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测结果来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut input = InputWrapper::from_url(&args.input)?;
  let model = ReplayModel::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let policy = if args.clamp {
    OutOfRangePolicy::Clamp
  } else {
    OutOfRangePolicy::Discard
  };
  let overlay = match &args.font {
    Some(path) => Overlay::new(Normalizer::new(policy)).with_font(Overlay::load_font(path)?),
    None => Overlay::new(Normalizer::new(policy)),
  };
  let mut session = DetectionSession::new(
    overlay,
    Container::new(args.width, args.height),
    args.backing_scale,
  )
  .with_mode(input.mode());

  let mut frame_loop = FrameLoop::new()
    .with_frame_interval(Duration::from_millis(args.frame_interval_ms))
    .with_frame_limit(args.frame_number);

  let controller = frame_loop.controller();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    controller.stop();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let exit = frame_loop.run(&mut session, &mut input, &model, &output)?;
  let stats = frame_loop.stats();
  info!(
    "任务结束: {:?}, 共 {} 帧, 最后一帧推理 {:.1} FPS, 总计 {:.1} FPS",
    exit,
    stats.frames,
    stats.model_fps(),
    stats.total_fps()
  );

  Ok(())
}
