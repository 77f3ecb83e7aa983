// =============================================================================
// DEMO RUNNER - winit window + Renderer driving a `Demo`
// =============================================================================
//
// EVENT FLOW:
// 1. resumed: create the window, the Renderer, then the demo's resources
// 2. about_to_wait: request a redraw (the loop polls, so this is continuous)
// 3. RedrawRequested: demo.update(dt), then Renderer::draw_frame(demo.record)
// 4. Resized: forwarded to the Renderer, a zero size pauses drawing
// 5. CloseRequested / quit key: exit, the GPU is idled before teardown
//
// =============================================================================

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::config::Config;
use crate::renderer::{FrameContext, Renderer, RendererSettings};

// =============================================================================
// DEMO TRAIT
// =============================================================================

/// A small program rendered by the runner
pub trait Demo: Sized {
    /// Create GPU resources once the renderer exists
    fn init(renderer: &Renderer) -> Result<Self>;

    /// Advance by `dt` seconds before the frame is drawn
    fn update(&mut self, _renderer: &Renderer, _dt: f32) {}

    /// Record draw commands inside the frame's render pass
    fn record(&mut self, frame: &mut FrameContext) -> Result<()>;
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Load config, set up logging and run `D` until the window closes
pub fn main<D: Demo>() -> Result<()> {
    let config = Config::load();
    init_logging(&config);

    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    run::<D>(config)
}

pub fn run<D: Demo>(config: Config) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = DemoApp::<D>::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// =============================================================================
// LOGGING
// =============================================================================

fn parse_level(name: &str) -> Option<log::LevelFilter> {
    name.trim().parse().ok()
}

/// Initialize env_logger from the config, RUST_LOG still overrides
pub fn init_logging(config: &Config) {
    let level = parse_level(&config.debug.log_level);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.unwrap_or(log::LevelFilter::Info));
    builder.parse_default_env();

    let mut file_error = None;
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== {} log ===", config.window.title);
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    if builder.try_init().is_err() {
        return;
    }

    if level.is_none() {
        log::warn!("Unknown log level '{}', using info", config.debug.log_level);
    }
    if let Some(e) = file_error {
        log::warn!("Could not open log file {}: {}", config.debug.log_file, e);
    }
}

// =============================================================================
// KEY BINDINGS
// =============================================================================

/// Key name from the config ("Escape", "F11", "Q", "Space", ...)
pub fn parse_key(name: &str) -> Option<KeyCode> {
    let name = name.trim();
    let upper = name.to_ascii_uppercase();

    let key = match upper.as_str() {
        "ESCAPE" | "ESC" => KeyCode::Escape,
        "SPACE" => KeyCode::Space,
        "ENTER" | "RETURN" => KeyCode::Enter,
        "TAB" => KeyCode::Tab,
        "BACKSPACE" => KeyCode::Backspace,
        "F1" => KeyCode::F1,
        "F2" => KeyCode::F2,
        "F3" => KeyCode::F3,
        "F4" => KeyCode::F4,
        "F5" => KeyCode::F5,
        "F6" => KeyCode::F6,
        "F7" => KeyCode::F7,
        "F8" => KeyCode::F8,
        "F9" => KeyCode::F9,
        "F10" => KeyCode::F10,
        "F11" => KeyCode::F11,
        "F12" => KeyCode::F12,
        _ => return single_char_key(&upper),
    };

    Some(key)
}

fn single_char_key(upper: &str) -> Option<KeyCode> {
    let mut chars = upper.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    const LETTERS: [KeyCode; 26] = [
        KeyCode::KeyA, KeyCode::KeyB, KeyCode::KeyC, KeyCode::KeyD, KeyCode::KeyE, KeyCode::KeyF,
        KeyCode::KeyG, KeyCode::KeyH, KeyCode::KeyI, KeyCode::KeyJ, KeyCode::KeyK, KeyCode::KeyL,
        KeyCode::KeyM, KeyCode::KeyN, KeyCode::KeyO, KeyCode::KeyP, KeyCode::KeyQ, KeyCode::KeyR,
        KeyCode::KeyS, KeyCode::KeyT, KeyCode::KeyU, KeyCode::KeyV, KeyCode::KeyW, KeyCode::KeyX,
        KeyCode::KeyY, KeyCode::KeyZ,
    ];
    const DIGITS: [KeyCode; 10] = [
        KeyCode::Digit0, KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3, KeyCode::Digit4,
        KeyCode::Digit5, KeyCode::Digit6, KeyCode::Digit7, KeyCode::Digit8, KeyCode::Digit9,
    ];

    match c {
        'A'..='Z' => Some(LETTERS[(c as u8 - b'A') as usize]),
        '0'..='9' => Some(DIGITS[(c as u8 - b'0') as usize]),
        _ => None,
    }
}

fn key_binding(action: &str, name: &str) -> Option<KeyCode> {
    let key = parse_key(name);
    if key.is_none() && !name.trim().is_empty() {
        log::warn!("Unknown {} key '{}', binding disabled", action, name);
    }
    key
}

// =============================================================================
// FPS COUNTER
// =============================================================================

/// Frame rate over one-second windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub fps: f32,
    pub frame_ms: f32,
}

#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
    last_frame: Instant,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            last_frame: now,
        }
    }

    /// Count a frame; yields a sample once a full second has passed
    pub fn tick(&mut self, now: Instant) -> Option<FpsSample> {
        let frame_time = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frames += 1;

        let elapsed = now.duration_since(self.window_start);
        if elapsed < Self::WINDOW {
            return None;
        }

        let sample = FpsSample {
            fps: self.frames as f32 / elapsed.as_secs_f32(),
            frame_ms: frame_time.as_secs_f32() * 1000.0,
        };

        self.frames = 0;
        self.window_start = now;
        Some(sample)
    }
}

pub fn format_title(title: &str, sample: FpsSample, fullscreen: bool) -> String {
    let mode = if fullscreen { "fullscreen" } else { "windowed" };
    format!("{} - {:.0} FPS ({:.2}ms) [{}]", title, sample.fps, sample.frame_ms, mode)
}

// =============================================================================
// APPLICATION
// =============================================================================

struct DemoApp<D: Demo> {
    config: Config,
    quit_key: Option<KeyCode>,
    fullscreen_key: Option<KeyCode>,
    window: Option<Arc<Window>>,
    demo: Option<D>,
    renderer: Option<Renderer>,
    fps: FpsCounter,
    last_update: Instant,
    is_fullscreen: bool,
    error: Option<anyhow::Error>,
}

impl<D: Demo> DemoApp<D> {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            quit_key: key_binding("quit", &config.controls.quit_key),
            fullscreen_key: key_binding("fullscreen", &config.controls.fullscreen_key),
            is_fullscreen: config.window.fullscreen,
            config,
            window: None,
            demo: None,
            renderer: None,
            fps: FpsCounter::new(now),
            last_update: now,
            error: None,
        }
    }

    fn init(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        let renderer = Renderer::new(
            window,
            size.width,
            size.height,
            RendererSettings::from_config(&self.config),
        )?;

        let demo = D::init(&renderer)?;
        self.demo = Some(demo);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<bool> {
        let (Some(renderer), Some(demo)) = (self.renderer.as_mut(), self.demo.as_mut()) else {
            return Ok(false);
        };

        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        demo.update(renderer, dt);
        renderer.draw_frame(|frame| demo.record(frame))
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = &self.window else {
            return;
        };

        self.is_fullscreen = !self.is_fullscreen;
        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        if let Some(renderer) = &mut self.renderer {
            renderer.request_recreate();
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        if let (Some(sample), Some(window)) = (self.fps.tick(Instant::now()), &self.window) {
            window.set_title(&format_title(&self.config.window.title, sample, self.is_fullscreen));
        }
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = &self.renderer {
            if let Err(e) = renderer.wait_idle() {
                log::error!("Failed to wait for GPU before shutdown: {:?}", e);
            }
        }
        self.demo = None;
        self.renderer = None;
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:?}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl<D: Demo> ApplicationHandler for DemoApp<D> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Create the window
        // ─────────────────────────────────────────────────────────────────────
        let mut attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Create the renderer and the demo's GPU resources
        // ─────────────────────────────────────────────────────────────────────
        if let Err(e) = self.init(&window) {
            return self.fail(event_loop, e.context("Failed to initialize Vulkan"));
        }

        self.last_update = Instant::now();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => log::error!("Render error: {:?}", e),
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                if Some(key) == self.quit_key {
                    log::info!("{:?} pressed, exiting...", key);
                    event_loop.exit();
                } else if Some(key) == self.fullscreen_key {
                    self.toggle_fullscreen();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl<D: Demo> Drop for DemoApp<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_keys() {
        assert_eq!(parse_key("Escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key("esc"), Some(KeyCode::Escape));
        assert_eq!(parse_key("F11"), Some(KeyCode::F11));
        assert_eq!(parse_key(" space "), Some(KeyCode::Space));
        assert_eq!(parse_key("Return"), Some(KeyCode::Enter));
    }

    #[test]
    fn parses_letters_and_digits() {
        assert_eq!(parse_key("q"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key("Z"), Some(KeyCode::KeyZ));
        assert_eq!(parse_key("7"), Some(KeyCode::Digit7));
    }

    #[test]
    fn unknown_keys_are_none() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("F13"), None);
        assert_eq!(parse_key("QQ"), None);
        assert_eq!(parse_key("ß"), None);
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_level("debug"), Some(log::LevelFilter::Debug));
        assert_eq!(parse_level("WARN"), Some(log::LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn fps_sample_after_one_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        for i in 1..60 {
            assert_eq!(fps.tick(start + Duration::from_millis(i * 16)), None);
        }

        let sample = fps.tick(start + Duration::from_millis(1000)).unwrap();
        assert!((sample.fps - 60.0).abs() < 0.01);
        assert!((sample.frame_ms - 56.0).abs() < 0.01);
    }

    #[test]
    fn fps_window_restarts_after_sample() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        assert!(fps.tick(start + Duration::from_secs(1)).is_some());
        assert_eq!(fps.tick(start + Duration::from_millis(1500)), None);

        let sample = fps.tick(start + Duration::from_secs(2)).unwrap();
        assert!((sample.fps - 2.0).abs() < 0.01);
    }

    #[test]
    fn title_includes_fps_and_mode() {
        let sample = FpsSample {
            fps: 59.6,
            frame_ms: 16.78,
        };
        assert_eq!(
            format_title("Demo", sample, false),
            "Demo - 60 FPS (16.78ms) [windowed]"
        );
    }
}
