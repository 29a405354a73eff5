//! Command line argument parsing using clap.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use remote_session::{self as session, Devices, SessionRequest};
use wlremote_client::{
    input::{Action, KeyBindings},
    Config,
};

/// Wayland client which injects input into the compositor through a remote desktop session
#[deny(missing_docs)]
#[derive(Parser, Debug)]
#[clap(about, author, version)]
pub struct Args {
    /// Title of the window.
    #[clap(long, default_value = "Example client")]
    pub title: String,

    /// Width of the window if the compositor does not suggest one.
    #[clap(long, default_value_t = 300)]
    pub width: u32,

    /// Height of the window if the compositor does not suggest one.
    #[clap(long, default_value_t = 300)]
    pub height: u32,

    /// Key code which quits the client.
    #[clap(long, default_value_t = KeyBindings::DEFAULT_QUIT)]
    pub quit_key: u32,

    /// Key code which injects pointer motion.
    #[clap(long, default_value_t = KeyBindings::DEFAULT_INJECT)]
    pub inject_key: u32,

    /// Key code which closes the remote desktop session and requests a new one.
    #[clap(long)]
    pub reconnect_key: Option<u32>,

    /// Do not negotiate a remote desktop session.
    #[clap(long)]
    pub no_session: bool,

    /// The kind of output the session is associated with.
    #[clap(value_enum, default_value_t, long)]
    pub outputs: Outputs,

    /// How the cursor is represented to the session.
    #[clap(value_enum, default_value_t, long)]
    pub cursor: Cursor,

    /// Milliseconds between render ticks.
    #[clap(long, default_value_t = 16)]
    pub frame_interval_ms: u64,

    /// Horizontal pointer motion injected by the inject key.
    #[clap(long, default_value_t = 10.0, allow_negative_numbers = true)]
    pub inject_dx: f64,

    /// Vertical pointer motion injected by the inject key.
    #[clap(long, default_value_t = 10.0, allow_negative_numbers = true)]
    pub inject_dy: f64,
}

/// Output selections.
#[deny(missing_docs)]
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Outputs {
    /// A whole monitor.
    #[default]
    Monitor,

    /// A single window.
    Window,

    /// A virtual output created for the session.
    Virtual,
}

/// Cursor modes.
#[deny(missing_docs)]
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// The cursor is not part of the session.
    #[default]
    Hidden,

    /// The cursor is drawn into the output.
    Embedded,

    /// The cursor is sent as metadata.
    Metadata,
}

impl Args {
    pub fn into_config(self) -> Config {
        let mut bindings = KeyBindings::empty();
        bindings
            .bind(self.quit_key, Action::Quit)
            .bind(self.inject_key, Action::Inject);

        if let Some(key) = self.reconnect_key {
            bindings.bind(key, Action::Reconnect);
        }

        let session = (!self.no_session).then_some(SessionRequest {
            devices: Devices::KEYBOARD | Devices::POINTER,
            outputs: match self.outputs {
                Outputs::Monitor => session::OutputSelection::Monitor,
                Outputs::Window => session::OutputSelection::Window,
                Outputs::Virtual => session::OutputSelection::Virtual,
            },
            cursor_mode: match self.cursor {
                Cursor::Hidden => session::CursorMode::Hidden,
                Cursor::Embedded => session::CursorMode::Embedded,
                Cursor::Metadata => session::CursorMode::Metadata,
            },
        });

        Config {
            title: self.title,
            width: self.width,
            height: self.height,
            bindings,
            session,
            inject_delta: (self.inject_dx, self.inject_dy),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
        }
    }
}
