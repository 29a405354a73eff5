use std::{fmt, io, ops::RangeInclusive};

use wayland_client::{backend::WaylandError, globals::GlobalError, ConnectError, DispatchError};

/// Fatal errors while setting up the client.
///
/// None of these are retried, the compositor environment is assumed to stay the same while the client runs.
#[derive(Debug, thiserror::Error)]
pub enum Setup {
    /// Could not connect to the display server.
    #[error("could not connect to the display server: {0}")]
    Connect(#[from] ConnectError),

    /// The initial registry roundtrip failed.
    #[error("could not get the global list: {0}")]
    Registry(#[from] GlobalError),

    /// One or more required globals are missing.
    ///
    /// This may indicate the compositor does not implement the xdg-shell protocol.
    #[error("some required globals are missing: {}", DisplayMissing(.0))]
    MissingGlobals(Vec<MissingGlobal>),

    /// Dispatching the initial events failed.
    #[error("could not dispatch events: {0}")]
    Dispatch(#[from] DispatchError),

    /// The connection to the display server failed.
    #[error("connection error: {0}")]
    Connection(#[from] WaylandError),

    /// The window was already created.
    #[error("the window was already created")]
    WindowExists,

    /// The event loop could not be created or a source could not be inserted.
    #[error("event loop error: {0}")]
    EventLoop(#[from] calloop::Error),

    /// An [`io::Error`].
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A missing global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingGlobal {
    /// A global with the specified interface is not available.
    NotAvailable { interface: &'static str },

    /// A global with the interface is available, but not at a compatible version.
    IncompatibleVersion {
        /// Name of the interface
        interface: &'static str,

        /// Advertised version
        available: u32,

        /// The compatible versions
        compatible: RangeInclusive<u32>,
    },
}

impl fmt::Display for MissingGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingGlobal::NotAvailable { interface } => write!(f, "\"{interface}\" is not available"),
            MissingGlobal::IncompatibleVersion {
                interface,
                available,
                compatible,
            } => write!(
                f,
                "\"{interface}\" is available at version {available}, but {}..={} is required",
                compatible.start(),
                compatible.end()
            ),
        }
    }
}

struct DisplayMissing<'a>(&'a [MissingGlobal]);

impl fmt::Display for DisplayMissing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, missing) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }

            fmt::Display::fmt(missing, f)?;
        }

        Ok(())
    }
}
