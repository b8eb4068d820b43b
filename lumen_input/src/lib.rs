//! Input state machines, timers and the per-canvas event system: the part
//! of the runtime that turns backend window events into typed gesture and
//! timer events for view controllers and application callbacks to consume.

pub mod event;
pub mod keyboard;
pub mod mouse;
pub mod timer;

pub use event::{CallbackMode, Event, EventQueue};
pub use keyboard::{KeyboardState, KeyboardStatus, Modifiers};
pub use mouse::{MouseButton, MouseEvent, MouseState, MouseStatus};
pub use timer::{Timer, TimerSet, TimerTick};
