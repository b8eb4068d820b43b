//! Keyboard state machine: pressed-key set and modifier tracking.
//!
//! Grounded in `original_source/src/input.c`'s `_is_key_modifier` and the
//! keyboard half of `DvzKeyboard`, reworked around a fixed-capacity
//! `Vec`-backed set instead of a raw C array with a manual length field.

pub const MAX_KEYS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Shift,
    Control,
    Alt,
    Super,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub super_: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardStatus {
    Inactive,
    Active,
    Captured,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyboardEvent {
    Press(Key),
    Release(Key),
    Repeat(Key),
}

fn key_modifier(key: Key) -> Option<fn(&mut Modifiers, bool)> {
    match key {
        Key::Shift => Some(|m, v| m.shift = v),
        Key::Control => Some(|m, v| m.control = v),
        Key::Alt => Some(|m, v| m.alt = v),
        Key::Super => Some(|m, v| m.super_ = v),
        Key::Other(_) => None,
    }
}

/// Tracks the set of currently pressed non-modifier keys plus the live
/// modifier mask, one per canvas/window.
#[derive(Debug, Clone)]
pub struct KeyboardState {
    keys: Vec<Key>,
    pub mods: Modifiers,
    pub status: KeyboardStatus,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self {
            keys: Vec::with_capacity(MAX_KEYS),
            mods: Modifiers::default(),
            status: KeyboardStatus::Inactive,
        }
    }

    pub fn pressed_keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_captured(&self) -> bool {
        self.status == KeyboardStatus::Captured
    }

    pub fn set_captured(&mut self, captured: bool) {
        self.status = if captured {
            KeyboardStatus::Captured
        } else if self.keys.is_empty() {
            KeyboardStatus::Inactive
        } else {
            KeyboardStatus::Active
        };
    }

    /// Returns `None` for a repeat (key already pressed) — callers should
    /// emit a `Repeat` event themselves without mutating state further.
    pub fn press(&mut self, key: Key) -> Option<KeyboardEvent> {
        if let Some(setter) = key_modifier(key) {
            setter(&mut self.mods, true);
            return None;
        }
        if self.keys.contains(&key) {
            return Some(KeyboardEvent::Repeat(key));
        }
        if self.keys.len() >= MAX_KEYS {
            return None;
        }
        self.keys.push(key);
        if self.status != KeyboardStatus::Captured {
            self.status = KeyboardStatus::Active;
        }
        Some(KeyboardEvent::Press(key))
    }

    pub fn release(&mut self, key: Key) -> Option<KeyboardEvent> {
        if let Some(setter) = key_modifier(key) {
            setter(&mut self.mods, false);
            return None;
        }
        if let Some(pos) = self.keys.iter().position(|&k| k == key) {
            self.keys.remove(pos);
            if self.keys.is_empty() && self.status != KeyboardStatus::Captured {
                self.status = KeyboardStatus::Inactive;
            }
            Some(KeyboardEvent::Release(key))
        } else {
            None
        }
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_adds_to_set_and_activates() {
        let mut kb = KeyboardState::new();
        let ev = kb.press(Key::Other(b'a' as u32));
        assert!(matches!(ev, Some(KeyboardEvent::Press(_))));
        assert_eq!(kb.status, KeyboardStatus::Active);
        assert_eq!(kb.pressed_keys().len(), 1);
    }

    #[test]
    fn repeated_press_emits_repeat_without_duplicating() {
        let mut kb = KeyboardState::new();
        kb.press(Key::Other(1));
        let ev = kb.press(Key::Other(1));
        assert!(matches!(ev, Some(KeyboardEvent::Repeat(_))));
        assert_eq!(kb.pressed_keys().len(), 1);
    }

    #[test]
    fn release_removes_key_and_goes_inactive_when_empty() {
        let mut kb = KeyboardState::new();
        kb.press(Key::Other(1));
        kb.release(Key::Other(1));
        assert_eq!(kb.status, KeyboardStatus::Inactive);
        assert!(kb.pressed_keys().is_empty());
    }

    #[test]
    fn modifiers_do_not_enter_pressed_set() {
        let mut kb = KeyboardState::new();
        assert!(kb.press(Key::Shift).is_none());
        assert!(kb.mods.shift);
        assert!(kb.pressed_keys().is_empty());
        assert!(kb.release(Key::Shift).is_none());
        assert!(!kb.mods.shift);
    }

    #[test]
    fn capacity_is_capped_at_max_keys() {
        let mut kb = KeyboardState::new();
        for i in 0..MAX_KEYS as u32 {
            assert!(kb.press(Key::Other(i)).is_some());
        }
        assert!(kb.press(Key::Other(999)).is_none());
        assert_eq!(kb.pressed_keys().len(), MAX_KEYS);
    }

    #[test]
    fn captured_state_survives_until_explicitly_cleared() {
        let mut kb = KeyboardState::new();
        kb.set_captured(true);
        kb.press(Key::Other(1));
        assert_eq!(kb.status, KeyboardStatus::Captured);
        kb.release(Key::Other(1));
        assert_eq!(kb.status, KeyboardStatus::Captured);
        kb.set_captured(false);
        assert_eq!(kb.status, KeyboardStatus::Inactive);
    }
}
