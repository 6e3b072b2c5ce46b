// 该文件是 Chongjian （虫鉴） 项目的一部分。
// src/task.rs - 检测任务与帧循环
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

use std::{
  sync::mpsc::{self, Receiver, Sender},
  time::{Duration, Instant},
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{BaseImage, Tagged},
  model::{DetectionBatch, Model},
  output::Render,
  session::{ApplyOutcome, DetectionSession, InputMode, SessionError},
  surface::{Container, Surface},
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单次检测：取一帧，检测一次，绘制一次
pub struct OneShotTask<'a> {
  session: &'a mut DetectionSession,
}

impl<'a> OneShotTask<'a> {
  pub fn new(session: &'a mut DetectionSession) -> Self {
    Self { session }
  }
}

impl<
  IE: std::fmt::Display,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<RgbImage, IE>>,
  M: Model<Input = BaseImage, Output = DetectionBatch, Error = ME>,
  O: Render<Surface, DetectionBatch, Error = RE>,
> Task<I, M, O> for OneShotTask<'_>
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    self.session.load_decoded(frame)?;
    if self.session.surface().geometry().is_none() {
      info!("显示表面尚未布局，跳过检测");
      return Ok(());
    }

    let pending = self.session.begin_detect()?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = match model.infer(&pending.value) {
      Ok(result) => result,
      Err(e) => {
        self.session.fail(&format!("检测失败: {}", e));
        return Err(e.into());
      }
    };
    info!("推理完成，耗时: {:.2?}, 检测框 {} 个", now.elapsed(), result.len());

    if let ApplyOutcome::Applied(summary) = self
      .session
      .apply_result(Tagged::new(pending.image, result))?
      && let Some(batch) = self.session.batch()
    {
      output.render_result(self.session.surface(), batch)?;
      info!(
        "渲染完成，绘制 {} 个检测框, 跳过 {} 个",
        summary.drawn, summary.skipped
      );
    }

    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum LoopError {
  #[error("会话错误: {0}")]
  SessionError(#[from] SessionError),
  #[error("推理失败: {0}")]
  Inference(#[source] BoxError),
  #[error("输出失败: {0}")]
  Output(#[source] BoxError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopState {
  #[default]
  Idle,
  Running,
  Errored(String),
}

/// 帧循环回到 Idle 的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
  Stopped,
  Paused,
  Hidden,
  SourceEnded,
  ModeSwitched(InputMode),
  FrameLimit,
}

#[derive(Debug, Clone, Copy)]
enum Control {
  Stop,
  Pause,
  Hide,
  SwitchMode(InputMode),
  Resize(Container),
  SetBackingScale(f32),
}

impl Control {
  /// 布局消息就地应用，循环继续；其余消息结束循环
  fn apply(self, session: &mut DetectionSession) -> Result<Option<LoopExit>, SessionError> {
    let exit = match self {
      Control::Resize(container) => {
        session.resize(container)?;
        return Ok(None);
      }
      Control::SetBackingScale(backing_scale) => {
        session.set_backing_scale(backing_scale)?;
        return Ok(None);
      }
      Control::Stop => LoopExit::Stopped,
      Control::Pause => LoopExit::Paused,
      Control::Hide => LoopExit::Hidden,
      Control::SwitchMode(mode) => LoopExit::ModeSwitched(mode),
    };
    Ok(Some(exit))
  }
}

/// 帧循环的控制端，可以在其他线程（如信号处理）中使用
#[derive(Debug, Clone)]
pub struct LoopController {
  tx: Sender<Control>,
}

impl LoopController {
  fn send(&self, control: Control) {
    if self.tx.send(control).is_err() {
      warn!("帧循环已销毁，忽略控制消息 {:?}", control);
    }
  }

  pub fn stop(&self) {
    self.send(Control::Stop);
  }

  /// 视频源暂停
  pub fn pause(&self) {
    self.send(Control::Pause);
  }

  /// 宿主界面不可见
  pub fn hide(&self) {
    self.send(Control::Hide);
  }

  /// 切换输入模式，运行中的帧循环先停止
  pub fn switch_mode(&self, mode: InputMode) {
    self.send(Control::SwitchMode(mode));
  }

  /// 容器尺寸变化，不打断帧循环
  pub fn resize(&self, container: Container) {
    self.send(Control::Resize(container));
  }

  pub fn set_backing_scale(&self, backing_scale: f32) {
    self.send(Control::SetBackingScale(backing_scale));
  }
}

/// 帧耗时统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
  pub frames: usize,
  pub inference: Duration,
  pub total: Duration,
}

fn millis_or_one(duration: Duration) -> f64 {
  let ms = duration.as_secs_f64() * 1000.0;
  if ms > 0.0 { ms } else { 1.0 }
}

impl LoopStats {
  fn record(&mut self, inference: Duration, total: Duration) {
    self.frames += 1;
    self.inference = inference;
    self.total = total;
  }

  pub fn model_fps(&self) -> f64 {
    1000.0 / millis_or_one(self.inference)
  }

  pub fn total_fps(&self) -> f64 {
    1000.0 / millis_or_one(self.total)
  }

  /// 推理以外的耗时（毫秒）
  pub fn overhead_ms(&self) -> f64 {
    let total = self.total.as_secs_f64() * 1000.0;
    let inference = self.inference.as_secs_f64() * 1000.0;
    (total - inference).abs()
  }
}

/// 帧循环：Idle → Running → (Idle | Errored)
///
/// 每次迭代依次获取一帧、推理、应用结果、输出，前一帧完全处理完之前不会获取新帧，
/// 因此同一时刻最多只有一个推理调用。迭代之间的等待会被控制消息立即打断。
/// 显示表面尚未布局时只载入帧，不推理也不输出，等待下一次尺寸变化。
pub struct FrameLoop {
  state: LoopState,
  tx: Sender<Control>,
  rx: Receiver<Control>,
  frame_interval: Duration,
  frame_limit: Option<usize>,
  stats: LoopStats,
}

impl Default for FrameLoop {
  fn default() -> Self {
    Self::new()
  }
}

impl FrameLoop {
  pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

  pub fn new() -> Self {
    let (tx, rx) = mpsc::channel();
    Self {
      state: LoopState::Idle,
      tx,
      rx,
      frame_interval: Self::DEFAULT_FRAME_INTERVAL,
      frame_limit: None,
      stats: LoopStats::default(),
    }
  }

  pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
    self.frame_interval = frame_interval;
    self
  }

  pub fn with_frame_limit(mut self, frame_limit: Option<usize>) -> Self {
    self.frame_limit = frame_limit;
    self
  }

  pub fn controller(&self) -> LoopController {
    LoopController {
      tx: self.tx.clone(),
    }
  }

  pub fn state(&self) -> &LoopState {
    &self.state
  }

  pub fn stats(&self) -> LoopStats {
    self.stats
  }

  /// 运行帧循环直到停止、源结束或出错
  ///
  /// 启动前积压的停止类消息会被丢弃，布局消息照常应用。
  /// 切换输入模式时循环先回到 Idle，再切换会话模式。
  pub fn run<I, IE, M, O>(
    &mut self,
    session: &mut DetectionSession,
    input: &mut I,
    model: &M,
    output: &O,
  ) -> Result<LoopExit, LoopError>
  where
    I: Iterator<Item = Result<RgbImage, IE>>,
    IE: std::fmt::Display,
    M: Model<Input = BaseImage, Output = DetectionBatch>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<Surface, DetectionBatch>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    self.state = LoopState::Running;
    self.stats = LoopStats::default();
    info!("帧循环开始");

    let result = self
      .drain_backlog(session)
      .and_then(|()| self.run_frames(session, input, model, output));
    match &result {
      Ok(exit) => {
        self.state = LoopState::Idle;
        info!("帧循环结束: {:?}, 共处理 {} 帧", exit, self.stats.frames);
        if let LoopExit::ModeSwitched(mode) = exit {
          session.switch_mode(*mode);
        }
      }
      Err(e) => {
        warn!("帧循环出错: {}", e);
        self.state = LoopState::Errored(e.to_string());
      }
    }
    result
  }

  fn drain_backlog(&self, session: &mut DetectionSession) -> Result<(), LoopError> {
    while let Ok(control) = self.rx.try_recv() {
      if let Some(exit) = control.apply(session)? {
        debug!("丢弃启动前积压的控制消息: {:?}", exit);
      }
    }
    Ok(())
  }

  fn run_frames<I, IE, M, O>(
    &mut self,
    session: &mut DetectionSession,
    input: &mut I,
    model: &M,
    output: &O,
  ) -> Result<LoopExit, LoopError>
  where
    I: Iterator<Item = Result<RgbImage, IE>>,
    IE: std::fmt::Display,
    M: Model<Input = BaseImage, Output = DetectionBatch>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<Surface, DetectionBatch>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    loop {
      while let Ok(control) = self.rx.try_recv() {
        if let Some(exit) = control.apply(session)? {
          return Ok(exit);
        }
      }

      let Some(frame) = input.next() else {
        return Ok(LoopExit::SourceEnded);
      };
      let started = Instant::now();
      session.load_decoded(frame)?;

      if session.surface().geometry().is_none() {
        debug!("显示表面尚未布局，跳过本帧检测");
      } else {
        self.detect_frame(session, model, output, started)?;
        if self.frame_limit.is_some_and(|n| self.stats.frames >= n) {
          info!("达到指定帧数 {}, 退出帧循环", self.stats.frames);
          return Ok(LoopExit::FrameLimit);
        }
      }

      if let Some(exit) = self.wait_next_frame(session)? {
        return Ok(exit);
      }
    }
  }

  fn detect_frame<M, O>(
    &mut self,
    session: &mut DetectionSession,
    model: &M,
    output: &O,
    started: Instant,
  ) -> Result<(), LoopError>
  where
    M: Model<Input = BaseImage, Output = DetectionBatch>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<Surface, DetectionBatch>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let pending = session.begin_detect()?;

    let inference_started = Instant::now();
    let result = match model.infer(&pending.value) {
      Ok(result) => result,
      Err(e) => {
        session.fail(&format!("检测失败: {}", e));
        return Err(LoopError::Inference(Box::new(e)));
      }
    };
    let inference = inference_started.elapsed();

    if let ApplyOutcome::Applied(_) = session.apply_result(Tagged::new(pending.image, result))?
      && let Some(batch) = session.batch()
      && let Err(e) = output.render_result(session.surface(), batch)
    {
      session.fail(&format!("输出失败: {}", e));
      return Err(LoopError::Output(Box::new(e)));
    }

    self.stats.record(inference, started.elapsed());
    debug!(
      "第 {} 帧: 推理 {:.2?} ({:.1} FPS), 总计 {:.2?} ({:.1} FPS), 额外开销 {:.2} ms",
      self.stats.frames,
      self.stats.inference,
      self.stats.model_fps(),
      self.stats.total,
      self.stats.total_fps(),
      self.stats.overhead_ms()
    );
    Ok(())
  }

  /// 等待下一次调度；停止类消息直接取消这次调度
  fn wait_next_frame(
    &self,
    session: &mut DetectionSession,
  ) -> Result<Option<LoopExit>, SessionError> {
    let deadline = Instant::now() + self.frame_interval;
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      match self.rx.recv_timeout(remaining) {
        Ok(control) => {
          if let Some(exit) = control.apply(session)? {
            return Ok(Some(exit));
          }
        }
        Err(_) => return Ok(None),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{CoordinateSpace, DetectionBox},
    output::draw::Overlay,
    session::SessionStatus,
  };
  use image::Rgb;
  use std::{
    cell::Cell,
    convert::Infallible,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
  };

  fn session() -> DetectionSession {
    DetectionSession::new(Overlay::default(), Container::new(64.0, 64.0), 1.0)
  }

  fn frames() -> impl Iterator<Item = Result<RgbImage, Infallible>> {
    std::iter::repeat_with(|| Ok::<_, Infallible>(RgbImage::from_pixel(16, 16, Rgb([0, 128, 0]))))
  }

  /// 记录同时在执行的推理调用数
  #[derive(Default)]
  struct CountingModel {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    on_infer: Option<Box<dyn Fn(usize) + Send + Sync>>,
  }

  impl Model for CountingModel {
    type Input = BaseImage;
    type Output = DetectionBatch;
    type Error = Infallible;

    fn infer(&self, _input: &BaseImage) -> Result<DetectionBatch, Infallible> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if let Some(hook) = &self.on_infer {
        hook(calls);
      }
      thread::sleep(Duration::from_micros(100));
      self.in_flight.fetch_sub(1, Ordering::SeqCst);

      Ok(DetectionBatch::new(
        CoordinateSpace::normalized(),
        vec![DetectionBox::new(100.0, 100.0, 900.0, 900.0, "aphid")],
      ))
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Input = BaseImage;
    type Output = DetectionBatch;
    type Error = std::io::Error;

    fn infer(&self, _input: &BaseImage) -> Result<DetectionBatch, std::io::Error> {
      Err(std::io::Error::other("service unavailable"))
    }
  }

  #[derive(Default)]
  struct CountingOutput {
    rendered: Cell<usize>,
    empty: Cell<usize>,
  }

  impl Render<Surface, DetectionBatch> for CountingOutput {
    type Error = Infallible;

    fn render_result(&self, frame: &Surface, _result: &DetectionBatch) -> Result<(), Infallible> {
      self.rendered.set(self.rendered.get() + 1);
      if frame.buffer().width() == 0 || frame.buffer().height() == 0 {
        self.empty.set(self.empty.get() + 1);
      }
      Ok(())
    }
  }

  fn unsized_session() -> DetectionSession {
    DetectionSession::new(Overlay::default(), Container::new(0.0, 0.0), 1.0)
  }

  #[test]
  fn never_two_inferences_in_flight_under_toggling() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new()
      .with_frame_interval(Duration::ZERO)
      .with_frame_limit(Some(40));
    let model = CountingModel::default();
    let output = CountingOutput::default();
    let mut input = frames();

    let controller = frame_loop.controller();
    let toggler = thread::spawn(move || {
      for _ in 0..500 {
        controller.stop();
        thread::sleep(Duration::from_micros(50));
      }
    });

    for _ in 0..30 {
      let exit = frame_loop
        .run(&mut session, &mut input, &model, &output)
        .unwrap();
      assert!(matches!(exit, LoopExit::Stopped | LoopExit::FrameLimit));
      assert_eq!(frame_loop.state(), &LoopState::Idle);
    }
    toggler.join().unwrap();

    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(model.in_flight.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn stop_during_inference_cancels_next_iteration() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::from_secs(30));
    let controller = frame_loop.controller();
    let model = CountingModel {
      on_infer: Some(Box::new(move |_| controller.stop())),
      ..Default::default()
    };
    let output = CountingOutput::default();

    let started = Instant::now();
    let exit = frame_loop
      .run(&mut session, &mut frames(), &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.rendered.get(), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
  }

  #[test]
  fn pause_and_hide_return_to_idle() {
    let mut session = session();
    let output = CountingOutput::default();

    for (send, expected) in [
      (LoopController::pause as fn(&LoopController), LoopExit::Paused),
      (LoopController::hide as fn(&LoopController), LoopExit::Hidden),
    ] {
      let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
      let controller = frame_loop.controller();
      let model = CountingModel {
        on_infer: Some(Box::new(move |calls| {
          if calls == 3 {
            send(&controller);
          }
        })),
        ..Default::default()
      };
      let exit = frame_loop
        .run(&mut session, &mut frames(), &model, &output)
        .unwrap();
      assert_eq!(exit, expected);
      assert_eq!(model.calls.load(Ordering::SeqCst), 3);
      assert_eq!(frame_loop.state(), &LoopState::Idle);
    }
  }

  #[test]
  fn source_end_returns_to_idle() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
    let model = CountingModel::default();
    let output = CountingOutput::default();
    let mut input = frames().take(3);

    let exit = frame_loop
      .run(&mut session, &mut input, &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::SourceEnded);
    assert_eq!(frame_loop.stats().frames, 3);
    assert_eq!(output.rendered.get(), 3);
    assert_eq!(session.status(), &SessionStatus::Ready);
  }

  #[test]
  fn inference_error_halts_without_retry() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
    let output = CountingOutput::default();

    let result = frame_loop.run(&mut session, &mut frames(), &FailingModel, &output);
    assert!(matches!(result, Err(LoopError::Inference(_))));
    assert!(matches!(frame_loop.state(), LoopState::Errored(_)));
    assert!(matches!(session.status(), SessionStatus::Failed(_)));
    assert_eq!(output.rendered.get(), 0);
  }

  #[test]
  fn decode_error_halts_loop() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
    let model = CountingModel::default();
    let output = CountingOutput::default();
    let mut input = vec![Err::<RgbImage, _>("broken frame")].into_iter();

    let result = frame_loop.run(&mut session, &mut input, &model, &output);
    assert!(matches!(
      result,
      Err(LoopError::SessionError(SessionError::Decode(_)))
    ));
    assert!(matches!(frame_loop.state(), LoopState::Errored(_)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn mode_switch_stops_loop_then_switches() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
    let controller = frame_loop.controller();
    let model = CountingModel {
      on_infer: Some(Box::new(move |_| controller.switch_mode(InputMode::Image))),
      ..Default::default()
    };
    let output = CountingOutput::default();

    let exit = frame_loop
      .run(&mut session, &mut frames(), &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::ModeSwitched(InputMode::Image));
    assert_eq!(session.mode(), InputMode::Image);
    assert_eq!(session.status(), &SessionStatus::Empty);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn unsized_surface_skips_detection_without_error() {
    let mut session = unsized_session();
    let mut frame_loop = FrameLoop::new().with_frame_interval(Duration::ZERO);
    let model = CountingModel::default();
    let output = CountingOutput::default();

    let exit = frame_loop
      .run(&mut session, &mut frames().take(3), &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::SourceEnded);
    assert_eq!(frame_loop.state(), &LoopState::Idle);
    assert_eq!(session.status(), &SessionStatus::Ready);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(output.rendered.get(), 0);
    assert_eq!(frame_loop.stats().frames, 0);
  }

  #[test]
  fn resize_while_running_starts_detection() {
    let mut session = unsized_session();
    let mut frame_loop = FrameLoop::new()
      .with_frame_interval(Duration::ZERO)
      .with_frame_limit(Some(2));
    let controller = frame_loop.controller();
    let mut input = frames().enumerate().map(move |(index, frame)| {
      if index == 2 {
        controller.resize(Container::new(64.0, 64.0));
      }
      frame
    });
    let model = CountingModel::default();
    let output = CountingOutput::default();

    let exit = frame_loop
      .run(&mut session, &mut input, &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::FrameLimit);
    assert_eq!(frame_loop.state(), &LoopState::Idle);
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(output.rendered.get(), 2);
    assert_eq!(output.empty.get(), 0);
    assert_eq!(session.surface().buffer().dimensions(), (16, 16));
  }

  #[test]
  fn backing_scale_change_keeps_loop_running() {
    let mut session = session();
    let mut frame_loop = FrameLoop::new()
      .with_frame_interval(Duration::ZERO)
      .with_frame_limit(Some(2));
    let controller = frame_loop.controller();
    let model = CountingModel {
      on_infer: Some(Box::new(move |calls| {
        if calls == 1 {
          controller.set_backing_scale(2.0);
        }
      })),
      ..Default::default()
    };
    let output = CountingOutput::default();

    let exit = frame_loop
      .run(&mut session, &mut frames(), &model, &output)
      .unwrap();
    assert_eq!(exit, LoopExit::FrameLimit);
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.surface().buffer().dimensions(), (32, 32));
  }

  #[test]
  fn one_shot_on_unsized_surface_skips_detection() {
    let mut session = unsized_session();
    let model = CountingModel::default();
    let output = CountingOutput::default();

    OneShotTask::new(&mut session)
      .run_task(frames(), &model, &output)
      .unwrap();
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(output.rendered.get(), 0);
    assert_eq!(session.status(), &SessionStatus::Ready);
  }

  #[test]
  fn one_shot_detect_renders_once() {
    let mut session = session();
    let model = CountingModel::default();
    let output = CountingOutput::default();

    OneShotTask::new(&mut session)
      .run_task(frames(), &model, &output)
      .unwrap();
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.rendered.get(), 1);
    assert_eq!(session.batch().map(|b| b.len()), Some(1));
  }

  #[test]
  fn one_shot_failure_clears_surface() {
    let mut session = session();
    let output = CountingOutput::default();

    let result = OneShotTask::new(&mut session).run_task(frames(), FailingModel, &output);
    assert!(result.is_err());
    assert!(matches!(session.status(), SessionStatus::Failed(_)));
    assert!(session.current_image().is_none());
    assert_eq!(output.rendered.get(), 0);
  }

  #[test]
  fn stats_guard_zero_durations() {
    let mut stats = LoopStats::default();
    assert_eq!(stats.model_fps(), 1000.0);
    stats.record(Duration::from_millis(20), Duration::from_millis(25));
    assert!((stats.model_fps() - 50.0).abs() < 1e-6);
    assert!((stats.total_fps() - 40.0).abs() < 1e-6);
    assert!((stats.overhead_ms() - 5.0).abs() < 1e-6);
    assert_eq!(stats.frames, 1);
  }
}
