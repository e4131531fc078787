// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use phongbox_core::{init_tracing, FrameStats, Timer};
use phongbox_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};
use phongbox_platform::{Surface, SurfaceEvent, SurfaceRegistry};
use phongbox_render::{FrameLoop, PointerInput, RenderSize, TickOutcome};
use phongbox_render_vk::{VkConfig, VkRenderer};
use tracing::{debug, error, info};

use crate::config::AppConfig;

/// How often a paused surface is polled for resumption.
const PAUSED_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; a missing file means defaults
    #[arg(long, default_value = "phongbox.toml")]
    config: PathBuf,
    /// Load phong.vert / phong.frag from this directory
    #[arg(long)]
    shader_dir: Option<PathBuf>,
}

struct App {
    cfg: AppConfig,
    vk: VkConfig,
    // Declared before `surfaces` so the renderer drops before its window.
    frames: FrameLoop<VkRenderer>,
    surfaces: SurfaceRegistry,
    main_window: Option<WindowId>,
    timer: Timer,
    stats: FrameStats,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppConfig, vk: VkConfig) -> Self {
        let frames = FrameLoop::new(cfg.camera())
            .with_spin_rate(cfg.render.spin_rate)
            .with_light(cfg.light());
        Self {
            cfg,
            vk,
            frames,
            surfaces: SurfaceRegistry::new(),
            main_window: None,
            timer: Timer::new(),
            stats: FrameStats::new(),
            failure: None,
        }
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let surface = Surface::create(event_loop, w.width, w.height, &w.title)?;
        let (width, height) = surface.state().size();
        let size = RenderSize {
            width: width.max(1),
            height: height.max(1),
        };
        let vk = &self.vk;
        self.frames
            .initialize(|| VkRenderer::new(surface.window(), surface.window(), size, vk))?;
        if let Some(r) = self.frames.backend() {
            if r.is_software() {
                info!("rendering on software adapter {}", r.adapter_name());
            }
        }
        self.main_window = Some(self.surfaces.register(surface));
        self.timer.reset();
        Ok(())
    }

    /// Record the first fatal error, release the GPU and leave the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        if let Err(shutdown) = self.frames.shutdown() {
            debug!("shutdown after failure: {shutdown:#}");
        }
        self.failure.get_or_insert(e);
        event_loop.exit();
    }

    fn close(&mut self, event_loop: &ActiveEventLoop, id: WindowId) {
        info!("close requested");
        if let Err(e) = self.frames.shutdown() {
            self.failure.get_or_insert(e);
        }
        self.surfaces.remove(id);
        event_loop.exit();
    }

    fn pointer(&mut self, input: PointerInput) {
        if let Err(e) = self.frames.on_pointer(input) {
            debug!("pointer input dropped: {e}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.main_window.is_some() || self.failure.is_some() {
            return;
        }
        if let Err(e) = self.open_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(ev) = self.surfaces.dispatch(window_id, &event) else {
            return;
        };
        match ev {
            SurfaceEvent::Resized { width, height } => {
                // Zero area means minimized; the surface state pauses rendering.
                if width > 0 && height > 0 {
                    if let Some(r) = self.frames.backend_mut() {
                        r.resize(RenderSize { width, height });
                    }
                }
            }
            SurfaceEvent::PointerDown { x, y, .. } => self.pointer(PointerInput::Down { x, y }),
            SurfaceEvent::PointerMoved { buttons, x, y } => {
                self.pointer(PointerInput::Moved { buttons, x, y })
            }
            SurfaceEvent::PointerUp { x, y, .. } => self.pointer(PointerInput::Up { x, y }),
            SurfaceEvent::CloseRequested => self.close(event_loop, window_id),
            SurfaceEvent::Focused(_) | SurfaceEvent::Occluded(_) => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() || self.failure.is_some() {
            return;
        }
        let Some(id) = self.main_window else {
            return;
        };
        let Some(paused) = self.surfaces.get(id).map(Surface::is_paused) else {
            return;
        };

        if paused && !self.timer.is_stopped() {
            self.timer.stop();
        } else if !paused && self.timer.is_stopped() {
            self.timer.start();
        }
        self.timer.tick();

        match self.frames.tick(paused, &self.timer) {
            Ok(TickOutcome::Rendered { .. }) => {
                if let Some(report) = self.stats.record(self.timer.total_time()) {
                    let status = format!("fps: {:.0}   mspf: {:.3}", report.fps, report.mspf);
                    debug!("{status}");
                    if let Some(surface) = self.surfaces.get(id) {
                        surface.set_status(&status);
                    }
                }
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Ok(TickOutcome::Idle) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + PAUSED_POLL));
            }
            Err(e) => self.fail(event_loop, e),
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let cfg = AppConfig::load(&args.config)?;
    let vk = cfg.vk_config(args.shader_dir);
    let event_loop = EventLoop::new().context("create event loop")?;

    let mut app = App::new(cfg, vk);
    event_loop.run_app(&mut app).context("event loop")?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => {
            info!("clean exit after {} frames", app.frames.frames_rendered());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
