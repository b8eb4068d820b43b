//! Mouse gesture state machine.
//!
//! Grounded in `original_source/src/mouse.c` (`_after_press`, `_after_release`,
//! `_after_move`, `_after_wheel`), generalized to Rust's `enum`-based state
//! representation instead of a raw `DvzMouseState` integer. One behavior
//! deliberately diverges from the C source: on the move that crosses the
//! drag threshold, this implementation emits both `DragStart` and `Drag`
//! (the C source emits only one, `DRAG_START`, on that move) — see
//! `DESIGN.md` for why the dual-emission reading was kept.

use std::time::Duration;

pub use crate::keyboard::Modifiers;

pub const CLICK_MAX_DELAY: Duration = Duration::from_millis(250);
pub const CLICK_MAX_SHIFT: f64 = 5.0;
pub const DOUBLE_CLICK_MAX_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseStatus {
    Release,
    Press,
    Click,
    ClickPress,
    DoubleClick,
    Dragging,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseEvent {
    Press {
        button: MouseButton,
        pos: [f64; 2],
        mods: Modifiers,
    },
    Release {
        button: MouseButton,
        pos: [f64; 2],
        mods: Modifiers,
    },
    Click {
        button: MouseButton,
        pos: [f64; 2],
        mods: Modifiers,
    },
    DoubleClick {
        button: MouseButton,
        pos: [f64; 2],
        mods: Modifiers,
    },
    DragStart {
        button: MouseButton,
        press_pos: [f64; 2],
        mods: Modifiers,
    },
    Drag {
        button: MouseButton,
        press_pos: [f64; 2],
        cur_pos: [f64; 2],
        mods: Modifiers,
    },
    DragStop {
        button: MouseButton,
        pos: [f64; 2],
        mods: Modifiers,
    },
    Wheel {
        dir: [f64; 2],
        pos: [f64; 2],
        mods: Modifiers,
    },
    Move {
        pos: [f64; 2],
        mods: Modifiers,
    },
}

/// Full mouse gesture state, one per canvas/window.
#[derive(Debug, Clone)]
pub struct MouseState {
    pub button: MouseButton,
    pub press_pos: [f64; 2],
    pub cur_pos: [f64; 2],
    pub last_pos: [f64; 2],
    press_time: Option<Duration>,
    last_click_time: Option<Duration>,
    pub status: MouseStatus,
    pub wheel_delta: [f64; 2],
    pub mods: Modifiers,
}

impl MouseState {
    pub fn new() -> Self {
        Self {
            button: MouseButton::None,
            press_pos: [0.0, 0.0],
            cur_pos: [0.0, 0.0],
            last_pos: [0.0, 0.0],
            press_time: None,
            last_click_time: None,
            status: MouseStatus::Release,
            wheel_delta: [0.0, 0.0],
            mods: Modifiers::default(),
        }
    }

    fn shift(from: [f64; 2], to: [f64; 2]) -> f64 {
        ((to[0] - from[0]).powi(2) + (to[1] - from[1]).powi(2)).sqrt()
    }

    /// Processes a press input; `now` is the current clock reading.
    pub fn press(&mut self, button: MouseButton, mods: Modifiers, now: Duration) -> Vec<MouseEvent> {
        self.mods = mods;
        match self.status {
            MouseStatus::Release => {
                self.button = button;
                self.press_pos = self.cur_pos;
                self.press_time = Some(now);
                self.status = MouseStatus::Press;
                vec![MouseEvent::Press {
                    button,
                    pos: self.cur_pos,
                    mods,
                }]
            }
            MouseStatus::Click => {
                let within_double_click = self
                    .last_click_time
                    .map(|t| now.saturating_sub(t) <= DOUBLE_CLICK_MAX_DELAY)
                    .unwrap_or(false);
                self.button = button;
                self.press_pos = self.cur_pos;
                self.press_time = Some(now);
                self.status = if within_double_click {
                    MouseStatus::ClickPress
                } else {
                    MouseStatus::Press
                };
                vec![MouseEvent::Press {
                    button,
                    pos: self.cur_pos,
                    mods,
                }]
            }
            _ => Vec::new(),
        }
    }

    pub fn release(&mut self, button: MouseButton, mods: Modifiers, now: Duration) -> Vec<MouseEvent> {
        self.mods = mods;
        match self.status {
            MouseStatus::Press => {
                let elapsed = self
                    .press_time
                    .map(|t| now.saturating_sub(t))
                    .unwrap_or(Duration::MAX);
                let shift = Self::shift(self.press_pos, self.cur_pos);
                let pos = self.cur_pos;
                if elapsed <= CLICK_MAX_DELAY && shift <= CLICK_MAX_SHIFT {
                    self.status = MouseStatus::Click;
                    self.last_click_time = Some(now);
                    vec![
                        MouseEvent::Release { button, pos, mods },
                        MouseEvent::Click { button, pos, mods },
                    ]
                } else {
                    self.status = MouseStatus::Release;
                    self.button = MouseButton::None;
                    vec![MouseEvent::Release { button, pos, mods }]
                }
            }
            MouseStatus::Dragging => {
                self.status = MouseStatus::Release;
                self.button = MouseButton::None;
                let pos = self.cur_pos;
                vec![
                    MouseEvent::Release { button, pos, mods },
                    MouseEvent::DragStop { button, pos, mods },
                ]
            }
            MouseStatus::ClickPress => {
                self.status = MouseStatus::Release;
                self.button = MouseButton::None;
                let pos = self.cur_pos;
                vec![
                    MouseEvent::Release { button, pos, mods },
                    MouseEvent::DoubleClick { button, pos, mods },
                ]
            }
            _ => Vec::new(),
        }
    }

    pub fn move_to(&mut self, pos: [f64; 2], mods: Modifiers) -> Vec<MouseEvent> {
        self.last_pos = self.cur_pos;
        self.cur_pos = pos;
        self.mods = mods;
        match self.status {
            MouseStatus::Press => {
                let shift = Self::shift(self.press_pos, pos);
                if shift > CLICK_MAX_SHIFT {
                    self.status = MouseStatus::Dragging;
                    vec![
                        MouseEvent::DragStart {
                            button: self.button,
                            press_pos: self.press_pos,
                            mods,
                        },
                        MouseEvent::Drag {
                            button: self.button,
                            press_pos: self.press_pos,
                            cur_pos: pos,
                            mods,
                        },
                    ]
                } else {
                    Vec::new()
                }
            }
            MouseStatus::Dragging => vec![MouseEvent::Drag {
                button: self.button,
                press_pos: self.press_pos,
                cur_pos: pos,
                mods,
            }],
            _ => vec![MouseEvent::Move { pos, mods }],
        }
    }

    pub fn wheel(&mut self, dir: [f64; 2], mods: Modifiers) -> Vec<MouseEvent> {
        self.mods = mods;
        self.wheel_delta = dir;
        vec![MouseEvent::Wheel {
            dir,
            pos: self.cur_pos,
            mods,
        }]
    }

    /// Clears transient wheel state. Called from the Deq post-callback after
    /// a wheel event has been dispatched, mirroring `original_source`'s
    /// `_input_proc_post_callback` resetting `mouse->wheel_delta`.
    pub fn clear_wheel(&mut self) {
        self.wheel_delta = [0.0, 0.0];
    }
}

impl Default for MouseState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn press_move_small_shift_stays_pressed() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        let events = m.move_to([2.0, 0.0], Modifiers::default());
        assert!(events.is_empty());
        assert_eq!(m.status, MouseStatus::Press);
    }

    #[test]
    fn press_move_large_shift_emits_drag_start_then_drag() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        let events = m.move_to([20.0, 0.0], Modifiers::default());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MouseEvent::DragStart { .. }));
        assert!(matches!(events[1], MouseEvent::Drag { .. }));
        assert_eq!(m.status, MouseStatus::Dragging);
    }

    #[test]
    fn quick_small_release_emits_click() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        let events = m.release(MouseButton::Left, Modifiers::default(), t(10));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MouseEvent::Release { .. }));
        assert!(matches!(events[1], MouseEvent::Click { .. }));
        assert_eq!(m.status, MouseStatus::Click);
    }

    #[test]
    fn slow_release_is_plain_release() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        let events = m.release(MouseButton::Left, Modifiers::default(), t(500));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MouseEvent::Release { .. }));
        assert_eq!(m.status, MouseStatus::Release);
    }

    #[test]
    fn double_click_sequence() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        m.release(MouseButton::Left, Modifiers::default(), t(10));
        assert_eq!(m.status, MouseStatus::Click);

        let press_events = m.press(MouseButton::Left, Modifiers::default(), t(50));
        assert_eq!(m.status, MouseStatus::ClickPress);
        assert!(matches!(press_events[0], MouseEvent::Press { .. }));

        let release_events = m.release(MouseButton::Left, Modifiers::default(), t(70));
        assert_eq!(release_events.len(), 2);
        assert!(matches!(release_events[1], MouseEvent::DoubleClick { .. }));
        assert_eq!(m.status, MouseStatus::Release);
    }

    #[test]
    fn dragging_release_emits_release_then_drag_stop() {
        let mut m = MouseState::new();
        m.press(MouseButton::Left, Modifiers::default(), t(0));
        m.move_to([50.0, 0.0], Modifiers::default());
        assert_eq!(m.status, MouseStatus::Dragging);
        let events = m.release(MouseButton::Left, Modifiers::default(), t(30));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MouseEvent::Release { .. }));
        assert!(matches!(events[1], MouseEvent::DragStop { .. }));
    }

    #[test]
    fn wheel_works_from_any_state() {
        let mut m = MouseState::new();
        let events = m.wheel([0.0, 1.0], Modifiers::default());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MouseEvent::Wheel { .. }));
        m.clear_wheel();
        assert_eq!(m.wheel_delta, [0.0, 0.0]);
    }
}
