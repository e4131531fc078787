// SPDX-License-Identifier: CEPL-1.0
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use phongbox_core::Timer;
use phongbox_math::{Mat4, OrbitCamera, PointerButtons, POLAR_MAX, POLAR_MIN};
use phongbox_render::{
    BackBufferRing, CommandListState, CompletionSignal, FenceCounter, FrameBackend, FrameInputs,
    FrameLoop, Lifecycle, PointerInput, ProtocolError, ResourceState, StateTracker, TickOutcome,
    BACK_BUFFER_COUNT,
};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Call {
    Update,
    Submit,
    Present(usize),
    Flush(u64),
    Release,
}

type Log = Rc<RefCell<Vec<Call>>>;

/// A queue that completes work as soon as it is waited on.
#[derive(Default)]
struct FakeQueue {
    signalled: u64,
    completed: Cell<u64>,
}

impl CompletionSignal for FakeQueue {
    fn enqueue_signal(&mut self, value: u64) -> Result<()> {
        self.signalled = value;
        Ok(())
    }
    fn completed_value(&self) -> Result<u64> {
        Ok(self.completed.get())
    }
    fn wait_for(&self, value: u64) -> Result<()> {
        if self.signalled >= value {
            self.completed.set(self.signalled);
        }
        Ok(())
    }
}

/// Plays the role of the GPU backend, enforcing the same protocol the real one does.
struct FakeBackend {
    log: Log,
    fence: FenceCounter<FakeQueue>,
    list: CommandListState,
    ring: BackBufferRing,
    images: StateTracker<usize>,
    last_inputs: Option<FrameInputs>,
    fail_submit: bool,
}

impl FakeBackend {
    fn new(log: Log) -> Self {
        let mut images = StateTracker::new();
        for i in 0..BACK_BUFFER_COUNT {
            images.register(i, ResourceState::Present);
        }
        Self {
            log,
            fence: FenceCounter::new(FakeQueue::default()),
            list: CommandListState::default(),
            ring: BackBufferRing::new(BACK_BUFFER_COUNT).unwrap(),
            images,
            last_inputs: None,
            fail_submit: false,
        }
    }
}

impl FrameBackend for FakeBackend {
    fn aspect_ratio(&self) -> f32 {
        4.0 / 3.0
    }

    fn update_constants(&mut self, inputs: &FrameInputs) -> Result<()> {
        self.log.borrow_mut().push(Call::Update);
        self.last_inputs = Some(*inputs);
        Ok(())
    }

    fn record_and_submit(&mut self) -> Result<()> {
        if self.fail_submit {
            bail!("device lost");
        }
        self.list.begin(self.fence.completed()?)?;
        let img = self.ring.current();
        self.images.transition(img, ResourceState::RenderTarget)?;
        self.images.expect(img, ResourceState::RenderTarget)?;
        self.images.transition(img, ResourceState::Present)?;
        self.list.close()?;
        self.list.submitted(self.fence.target() + 1)?;
        self.log.borrow_mut().push(Call::Submit);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let img = self.ring.current();
        self.images.expect(img, ResourceState::Present)?;
        self.log.borrow_mut().push(Call::Present(img));
        self.ring.advance();
        Ok(())
    }

    fn flush(&mut self) -> Result<u64> {
        let value = self.fence.flush()?;
        self.log.borrow_mut().push(Call::Flush(value));
        Ok(value)
    }

    fn release(&mut self) {
        self.log.borrow_mut().push(Call::Release);
    }
}

fn ready_loop() -> (FrameLoop<FakeBackend>, Log) {
    let log = Log::default();
    let mut frame_loop = FrameLoop::new(OrbitCamera::default());
    let backend_log = log.clone();
    frame_loop
        .initialize(move || Ok(FakeBackend::new(backend_log)))
        .unwrap();
    (frame_loop, log)
}

fn count(log: &Log, pred: impl Fn(&Call) -> bool) -> usize {
    log.borrow().iter().filter(|c| pred(c)).count()
}

#[test]
fn paused_ticks_issue_no_gpu_work() {
    let (mut frame_loop, log) = ready_loop();
    let timer = Timer::new();
    for _ in 0..10 {
        assert_eq!(frame_loop.tick(true, &timer).unwrap(), TickOutcome::Idle);
    }
    assert!(log.borrow().is_empty());
    assert_eq!(frame_loop.backend().unwrap().fence.target(), 0);
    assert_eq!(frame_loop.frames_rendered(), 0);
    assert_eq!(frame_loop.state(), Lifecycle::Idle);
}

#[test]
fn rendered_frames_follow_update_submit_present_flush() {
    let (mut frame_loop, log) = ready_loop();
    let timer = Timer::new();
    frame_loop.tick(false, &timer).unwrap();
    assert_eq!(
        *log.borrow(),
        [Call::Update, Call::Submit, Call::Present(0), Call::Flush(1)]
    );
}

#[test]
fn fence_values_increase_every_frame() {
    let (mut frame_loop, _log) = ready_loop();
    let timer = Timer::new();
    let mut last = 0;
    for _ in 0..20 {
        let TickOutcome::Rendered { fence } = frame_loop.tick(false, &timer).unwrap() else {
            panic!("expected a rendered frame");
        };
        assert!(fence > last);
        let backend = frame_loop.backend().unwrap();
        assert!(backend.fence.completed().unwrap() >= fence);
        last = fence;
    }
    assert_eq!(frame_loop.frames_rendered(), 20);
}

#[test]
fn back_buffers_alternate_and_return_to_present() {
    let (mut frame_loop, log) = ready_loop();
    let timer = Timer::new();
    for _ in 0..6 {
        frame_loop.tick(false, &timer).unwrap();
    }
    let presented: Vec<usize> = log
        .borrow()
        .iter()
        .filter_map(|c| match c {
            Call::Present(i) => Some(*i),
            _ => None,
        })
        .collect();
    assert_eq!(presented, [0, 1, 0, 1, 0, 1]);

    let backend = frame_loop.backend().unwrap();
    for i in 0..BACK_BUFFER_COUNT {
        assert_eq!(backend.images.state(i), Some(ResourceState::Present));
    }
}

#[test]
fn paused_and_running_frames_interleave() {
    let (mut frame_loop, log) = ready_loop();
    let timer = Timer::new();
    for i in 0..8 {
        frame_loop.tick(i % 2 == 1, &timer).unwrap();
    }
    assert_eq!(count(&log, |c| *c == Call::Submit), 4);
    assert_eq!(frame_loop.backend().unwrap().fence.target(), 4);
}

#[test]
fn shutdown_flushes_before_release() {
    let (mut frame_loop, log) = ready_loop();
    let timer = Timer::new();
    frame_loop.tick(false, &timer).unwrap();
    frame_loop.shutdown().unwrap();

    let log = log.borrow();
    let release = log.iter().position(|c| *c == Call::Release).unwrap();
    let last_flush = log.iter().rposition(|c| matches!(c, Call::Flush(_))).unwrap();
    assert_eq!(release, log.len() - 1);
    assert!(last_flush < release);
    assert_eq!(log[last_flush], Call::Flush(2));
    assert_eq!(frame_loop.state(), Lifecycle::Terminated);
}

#[test]
fn failed_frame_still_flushes_then_releases() {
    let log = Log::default();
    let mut frame_loop = FrameLoop::new(OrbitCamera::default());
    let backend_log = log.clone();
    frame_loop
        .initialize(move || {
            let mut backend = FakeBackend::new(backend_log);
            backend.fail_submit = true;
            Ok(backend)
        })
        .unwrap();

    let timer = Timer::new();
    assert!(frame_loop.tick(false, &timer).is_err());
    assert_eq!(frame_loop.state(), Lifecycle::Rendering);

    frame_loop.shutdown().unwrap();
    assert_eq!(*log.borrow(), [Call::Update, Call::Flush(1), Call::Release]);
    assert_eq!(frame_loop.state(), Lifecycle::Terminated);
}

#[test]
fn shutdown_is_idempotent() {
    let (mut frame_loop, log) = ready_loop();
    frame_loop.shutdown().unwrap();
    frame_loop.shutdown().unwrap();
    assert_eq!(count(&log, |c| *c == Call::Release), 1);
    assert!(frame_loop.backend().is_none());
}

#[test]
fn lifecycle_guards() {
    let mut frame_loop: FrameLoop<FakeBackend> = FrameLoop::new(OrbitCamera::default());
    assert_eq!(frame_loop.state(), Lifecycle::Uninitialized);

    let timer = Timer::new();
    let err = frame_loop.tick(false, &timer).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProtocolError>(),
        Some(&ProtocolError::WrongLifecycle(Lifecycle::Uninitialized))
    );

    let log = Log::default();
    let backend_log = log.clone();
    frame_loop
        .initialize(move || Ok(FakeBackend::new(backend_log)))
        .unwrap();
    assert_eq!(frame_loop.state(), Lifecycle::Initialized);
    assert!(frame_loop
        .initialize(|| Ok(FakeBackend::new(Log::default())))
        .is_err());

    frame_loop.shutdown().unwrap();
    assert!(frame_loop.tick(false, &timer).is_err());
    assert_eq!(
        frame_loop.on_pointer(PointerInput::Down { x: 0, y: 0 }),
        Err(ProtocolError::WrongLifecycle(Lifecycle::Terminated))
    );
}

#[test]
fn initialization_failure_leaves_loop_uninitialized() {
    let mut frame_loop: FrameLoop<FakeBackend> = FrameLoop::new(OrbitCamera::default());
    let err = frame_loop
        .initialize(|| bail!("no suitable adapter"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("no suitable adapter"));
    assert_eq!(frame_loop.state(), Lifecycle::Uninitialized);
    assert!(frame_loop.backend().is_none());
    frame_loop.shutdown().unwrap();
    assert_eq!(frame_loop.state(), Lifecycle::Terminated);
}

#[test]
fn pointer_drags_move_the_camera_between_frames() {
    let (mut frame_loop, _log) = ready_loop();
    let timer = Timer::new();
    let phi = frame_loop.camera().phi();

    frame_loop.on_pointer(PointerInput::Down { x: 100, y: 100 }).unwrap();
    frame_loop
        .on_pointer(PointerInput::Moved {
            buttons: PointerButtons::PRIMARY,
            x: 100,
            y: 5000,
        })
        .unwrap();
    frame_loop.on_pointer(PointerInput::Up { x: 100, y: 5000 }).unwrap();
    let camera = frame_loop.camera();
    assert!(camera.phi() != phi);
    assert!((POLAR_MIN..=POLAR_MAX).contains(&camera.phi()));

    frame_loop.tick(false, &timer).unwrap();
    let inputs = frame_loop.backend().unwrap().last_inputs.unwrap();
    assert_eq!(inputs.eye, frame_loop.camera().eye());
}

#[test]
fn frame_inputs_track_total_time_across_pauses() {
    let log = Log::default();
    let backend_log = log.clone();
    let mut frame_loop = FrameLoop::new(OrbitCamera::default()).with_spin_rate(0.5);
    frame_loop
        .initialize(move || Ok(FakeBackend::new(backend_log)))
        .unwrap();

    let t0 = Instant::now();
    let mut timer = Timer::new_at(t0);
    timer.tick_at(t0 + Duration::from_secs(1));
    timer.stop_at(t0 + Duration::from_secs(1));
    timer.start_at(t0 + Duration::from_secs(5));
    timer.tick_at(t0 + Duration::from_secs(6));

    frame_loop.tick(false, &timer).unwrap();
    let inputs = frame_loop.backend().unwrap().last_inputs.unwrap();
    assert!((inputs.total_time - 2.0).abs() < 1e-5);
    let expected = Mat4::from_rotation_y(0.5 * timer.total_time());
    assert!(inputs.world.abs_diff_eq(expected, 1e-6));
    let (object, _) = inputs.constants();
    assert_eq!(object.time, inputs.total_time);
}
