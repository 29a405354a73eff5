//! Decoding of seat input and the key binding table.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// A pointer or keyboard event.
///
/// Surface local coordinates are in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerEnter { serial: u32, x: f64, y: f64 },

    PointerLeave { serial: u32 },

    PointerMotion { time: u32, x: f64, y: f64 },

    PointerButton {
        serial: u32,
        time: u32,
        button: u32,
        state: ButtonState,
    },

    Key {
        serial: u32,
        time: u32,
        /// Evdev key code.
        key: u32,
        state: KeyState,
    },

    Modifiers {
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },

    /// Keyboard repeat rate in characters per second and delay in milliseconds.
    RepeatInfo { rate: i32, delay: i32 },

    /// A keymap was sent. The file descriptor is not kept.
    Keymap { format: u32, size: u32 },

    KeyboardEnter { serial: u32 },

    KeyboardLeave { serial: u32 },
}

/// Something a key press may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Stop the event loop.
    Quit,

    /// Inject pointer motion through the remote session.
    Inject,

    /// Close the remote session and request a new one.
    Reconnect,
}

/// Key bindings by evdev key code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: FxHashMap<u32, Action>,
}

impl KeyBindings {
    /// `KEY_Q`
    pub const DEFAULT_QUIT: u32 = 16;

    /// `KEY_X`
    pub const DEFAULT_INJECT: u32 = 45;

    /// A table without any bindings.
    pub fn empty() -> Self {
        Self {
            bindings: FxHashMap::default(),
        }
    }

    /// Bind a key, replacing any previous binding of the key.
    pub fn bind(&mut self, key: u32, action: Action) -> &mut Self {
        if let Some(previous) = self.bindings.insert(key, action) {
            if previous != action {
                tracing::debug!(key, ?previous, ?action, "Replaced key binding");
            }
        }

        self
    }

    pub fn get(&self, key: u32) -> Option<Action> {
        self.bindings.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        bindings
            .bind(Self::DEFAULT_QUIT, Action::Quit)
            .bind(Self::DEFAULT_INJECT, Action::Inject);
        bindings
    }
}

/// Turns input events into actions.
///
/// Events are handled in the order they are given and never coalesced.
#[derive(Debug, Default)]
pub struct InputDispatcher {
    bindings: KeyBindings,
    pointer_focus: bool,
    keyboard_focus: bool,
}

impl InputDispatcher {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            pointer_focus: false,
            keyboard_focus: false,
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Whether the pointer is over the window.
    pub fn has_pointer_focus(&self) -> bool {
        self.pointer_focus
    }

    /// Whether the window has keyboard focus.
    pub fn has_keyboard_focus(&self) -> bool {
        self.keyboard_focus
    }

    /// Handle an event, returning the bound action if it triggered one.
    ///
    /// Only key presses trigger actions.
    pub fn dispatch(&mut self, event: &InputEvent) -> Option<Action> {
        match *event {
            InputEvent::PointerEnter { serial, x, y } => {
                self.pointer_focus = true;
                tracing::debug!(serial, x, y, "Pointer entered");
            }

            InputEvent::PointerLeave { serial } => {
                self.pointer_focus = false;
                tracing::debug!(serial, "Pointer left");
            }

            InputEvent::PointerMotion { time, x, y } => {
                tracing::debug!(time, x, y, "Pointer moved");
            }

            InputEvent::PointerButton {
                serial,
                time,
                button,
                state,
            } => {
                tracing::debug!(serial, time, button, ?state, "Pointer button");
            }

            InputEvent::Key {
                serial,
                time,
                key,
                state,
            } => {
                tracing::debug!(serial, time, key, ?state, "Key");

                if state == KeyState::Pressed {
                    let action = self.bindings.get(key);

                    if let Some(action) = action {
                        tracing::debug!(key, ?action, "Key binding triggered");
                    }

                    return action;
                }
            }

            InputEvent::Modifiers {
                depressed,
                latched,
                locked,
                group,
            } => {
                tracing::debug!(depressed, latched, locked, group, "Modifiers");
            }

            InputEvent::RepeatInfo { rate, delay } => {
                tracing::debug!(rate, delay, "Keyboard repeat info");
            }

            InputEvent::Keymap { format, size } => {
                tracing::debug!(format, size, "Keymap");
            }

            InputEvent::KeyboardEnter { serial } => {
                self.keyboard_focus = true;
                tracing::debug!(serial, "Keyboard focus entered");
            }

            InputEvent::KeyboardLeave { serial } => {
                self.keyboard_focus = false;
                tracing::debug!(serial, "Keyboard focus left");
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, ButtonState, InputDispatcher, InputEvent, KeyBindings, KeyState};

    fn key(key: u32, state: KeyState) -> InputEvent {
        InputEvent::Key {
            serial: 1,
            time: 0,
            key,
            state,
        }
    }

    #[test]
    fn quit_in_a_batch_yields_one_request() {
        let mut dispatcher = InputDispatcher::new(KeyBindings::default());

        let batch = [
            InputEvent::PointerEnter {
                serial: 1,
                x: 10.0,
                y: 10.0,
            },
            InputEvent::PointerMotion {
                time: 2,
                x: 11.0,
                y: 12.0,
            },
            key(30, KeyState::Pressed),
            key(30, KeyState::Released),
            key(16, KeyState::Pressed),
            InputEvent::Modifiers {
                depressed: 0,
                latched: 0,
                locked: 0,
                group: 0,
            },
            key(16, KeyState::Released),
            InputEvent::PointerButton {
                serial: 3,
                time: 4,
                button: 0x110,
                state: ButtonState::Pressed,
            },
        ];

        let actions = batch
            .iter()
            .filter_map(|event| dispatcher.dispatch(event))
            .collect::<Vec<_>>();

        assert_eq!(actions, [Action::Quit]);
        assert!(dispatcher.has_pointer_focus());
    }

    #[test]
    fn inject_on_press_only() {
        let mut dispatcher = InputDispatcher::new(KeyBindings::default());

        assert_eq!(dispatcher.dispatch(&key(45, KeyState::Pressed)), Some(Action::Inject));
        assert_eq!(dispatcher.dispatch(&key(45, KeyState::Released)), None);
    }

    #[test]
    fn bindings_are_configurable() {
        let mut bindings = KeyBindings::empty();
        bindings.bind(1, Action::Quit).bind(19, Action::Reconnect);

        let mut dispatcher = InputDispatcher::new(bindings);
        assert_eq!(dispatcher.dispatch(&key(16, KeyState::Pressed)), None);
        assert_eq!(dispatcher.dispatch(&key(1, KeyState::Pressed)), Some(Action::Quit));
        assert_eq!(dispatcher.dispatch(&key(19, KeyState::Pressed)), Some(Action::Reconnect));

        let mut bindings = KeyBindings::default();
        bindings.bind(45, Action::Quit);
        assert_eq!(bindings.get(45), Some(Action::Quit));
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn focus_is_tracked() {
        let mut dispatcher = InputDispatcher::default();

        dispatcher.dispatch(&InputEvent::KeyboardEnter { serial: 5 });
        assert!(dispatcher.has_keyboard_focus());
        dispatcher.dispatch(&InputEvent::KeyboardLeave { serial: 6 });
        assert!(!dispatcher.has_keyboard_focus());
        assert!(!dispatcher.has_pointer_focus());
    }
}
