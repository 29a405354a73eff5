use std::time::Duration;

use remote_session::SessionRequest;

use crate::input::KeyBindings;

/// Startup parameters of the client.
#[derive(Debug, Clone)]
pub struct Config {
    pub title: String,

    /// Size of the render target when the compositor does not suggest one.
    pub width: u32,
    pub height: u32,

    pub bindings: KeyBindings,

    /// The remote desktop session to negotiate, if any.
    pub session: Option<SessionRequest>,

    /// Pointer motion injected by [`Action::Inject`](crate::input::Action::Inject).
    pub inject_delta: (f64, f64),

    /// Target interval between render ticks.
    pub frame_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Example client".into(),
            width: 300,
            height: 300,
            bindings: KeyBindings::default(),
            session: Some(SessionRequest::default()),
            inject_delta: (10.0, 10.0),
            frame_interval: Duration::from_millis(16),
        }
    }
}
