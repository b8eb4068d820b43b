//! Window lifecycle, backend event polling and routing to the mouse/
//! keyboard state machines.
//!
//! Grounded in `eclale/src/main.rs`'s winit event loop (`ControlFlow::Poll`,
//! matching on `WindowEvent`/`Event::AboutToWait`) generalized from one
//! hard-coded window to the multi-canvas `Client` spec §4.13 describes. A
//! `Backend` trait abstracts the windowing layer (spec component C4) so a
//! `HeadlessBackend` can satisfy the same interface for off-screen/CI runs.

use std::time::Duration;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key as WinitKey, NamedKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::{Window, WindowBuilder, WindowId};

use lumen_core::Clock;
use lumen_input::event::{Event as AppEvent, EventQueue};
use lumen_input::keyboard::{Key as KbKey, KeyboardState};
use lumen_input::mouse::{MouseButton, MouseState};

/// A live window plus the per-window state the client drives each frame.
pub struct ClientWindow {
    pub id: WindowId,
    pub window: Window,
    pub mouse: MouseState,
    pub keyboard: KeyboardState,
    pub events: EventQueue,
    pub clock: Clock,
    pub captured: bool,
    /// Raw mouse-gesture sink, fed every [`lumen_input::mouse::MouseEvent`]
    /// alongside the coarser [`AppEvent`] dispatch — view controllers
    /// (`lumen_interact::Panzoom`/`Arcball`) need the actual deltas the
    /// event queue's tagged union doesn't carry.
    pub on_mouse_event: Option<Box<dyn FnMut(&lumen_input::mouse::MouseEvent) + Send>>,
}

impl ClientWindow {
    pub fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.window_handle().unwrap().as_raw()
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.display_handle().unwrap().as_raw()
    }

    pub fn inner_size(&self) -> PhysicalSize<u32> {
        self.window.inner_size()
    }
}

fn to_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        _ => MouseButton::None,
    }
}

fn to_kb_key(key: &WinitKey) -> KbKey {
    match key {
        WinitKey::Named(NamedKey::Shift) => KbKey::Shift,
        WinitKey::Named(NamedKey::Control) => KbKey::Control,
        WinitKey::Named(NamedKey::Alt) => KbKey::Alt,
        WinitKey::Named(NamedKey::Super) => KbKey::Super,
        WinitKey::Character(s) => KbKey::Other(s.chars().next().map(|c| c as u32).unwrap_or(0)),
        _ => KbKey::Other(0),
    }
}

/// Owns every live window and runs the winit event loop, dispatching input
/// to each window's mouse/keyboard state machine and event queue. Spec
/// component C14.
pub struct Client {
    event_loop: Option<EventLoop<()>>,
    windows: Vec<ClientWindow>,
}

impl Client {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            event_loop: Some(EventLoop::new()?),
            windows: Vec::new(),
        })
    }

    pub fn create_window(&mut self, title: &str, width: u32, height: u32) -> anyhow::Result<WindowId> {
        let event_loop = self
            .event_loop
            .as_ref()
            .expect("event loop already consumed by run()");
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)?;
        let id = window.id();
        self.windows.push(ClientWindow {
            id,
            window,
            mouse: MouseState::new(),
            keyboard: KeyboardState::new(),
            events: EventQueue::new(),
            clock: Clock::new(),
            captured: false,
            on_mouse_event: None,
        });
        Ok(id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut ClientWindow> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    /// Runs the event loop until every window is closed, calling
    /// `on_redraw` once per window per `AboutToWait` tick after input has
    /// been dispatched for that tick.
    pub fn run(mut self, mut on_redraw: impl FnMut(&mut ClientWindow) + 'static) -> anyhow::Result<()> {
        let event_loop = self.event_loop.take().expect("event loop already consumed");
        let mut windows = std::mem::take(&mut self.windows);

        event_loop.run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                WinitEvent::WindowEvent { window_id, event } => {
                    let Some(win) = windows.iter_mut().find(|w| w.id == window_id) else {
                        return;
                    };
                    handle_window_event(win, event, elwt);
                }
                WinitEvent::AboutToWait => {
                    for win in windows.iter_mut() {
                        on_redraw(win);
                        win.window.request_redraw();
                    }
                }
                _ => {}
            }
        })?;
        Ok(())
    }
}

fn mouse_event_kind(event: &lumen_input::mouse::MouseEvent) -> AppEvent {
    use lumen_input::mouse::MouseEvent as M;
    match event {
        M::Press { .. } | M::Release { .. } => AppEvent::MouseButton,
        M::Move { .. } => AppEvent::MouseMove,
        M::DragStart { .. } | M::Drag { .. } => AppEvent::MouseDrag,
        M::DragStop { .. } => AppEvent::MouseDrag,
        M::Click { .. } => AppEvent::MouseClick,
        M::DoubleClick { .. } => AppEvent::MouseDoubleClick,
        M::Wheel { .. } => AppEvent::MouseWheel,
    }
}

fn handle_window_event(
    win: &mut ClientWindow,
    event: WindowEvent,
    elwt: &winit::event_loop::EventLoopWindowTarget<()>,
) {
    match event {
        WindowEvent::CloseRequested => elwt.exit(),
        WindowEvent::Resized(size) => {
            win.events
                .dispatch_sync(AppEvent::Resize { width: size.width, height: size.height });
        }
        WindowEvent::CursorMoved { position, .. } => {
            if win.captured {
                return;
            }
            let mods = win.keyboard.mods;
            let events = win.mouse.move_to([position.x, position.y], mods);
            for ev in events {
                win.events.dispatch_sync(mouse_event_kind(&ev));
                if let Some(sink) = win.on_mouse_event.as_mut() {
                    sink(&ev);
                }
            }
        }
        WindowEvent::MouseInput { state, button, .. } => {
            if win.captured {
                return;
            }
            let mods = win.keyboard.mods;
            let now = win.clock.elapsed_duration();
            let events = match state {
                ElementState::Pressed => win.mouse.press(to_mouse_button(button), mods, now),
                ElementState::Released => win.mouse.release(to_mouse_button(button), mods, now),
            };
            for ev in events {
                win.events.dispatch_sync(mouse_event_kind(&ev));
                if let Some(sink) = win.on_mouse_event.as_mut() {
                    sink(&ev);
                }
            }
        }
        WindowEvent::MouseWheel { delta, .. } => {
            if win.captured {
                return;
            }
            let dir = match delta {
                MouseScrollDelta::LineDelta(x, y) => [x as f64, y as f64],
                MouseScrollDelta::PixelDelta(p) => [p.x, p.y],
            };
            win.mouse.wheel(dir, win.keyboard.mods);
            win.events.dispatch_sync(AppEvent::MouseWheel);
        }
        WindowEvent::KeyboardInput { event, .. } => {
            if win.captured {
                return;
            }
            let key = to_kb_key(&event.logical_key);
            match event.state {
                ElementState::Pressed => {
                    win.keyboard.press(key);
                }
                ElementState::Released => {
                    win.keyboard.release(key);
                }
            }
            win.events.dispatch_sync(AppEvent::Key);
        }
        _ => {}
    }
}

/// Minimum poll interval the client falls back to between frames when
/// nothing else drives redraws (used by headless/offscreen runs that have
/// no compositor vsync to pace them).
pub const HEADLESS_FRAME_INTERVAL: Duration = Duration::from_millis(16);
