//! A Wayland client which injects input through a remote desktop session
//!
//! The client shows a window, renders into it with EGL and negotiates a remote desktop session with the
//! desktop portal, through which synthetic pointer and keyboard input is injected into the compositor.
//!
//! # Overview
//!
//! [`Client`] holds every component and is driven by events:
//!
//! - [`ObjectRegistry`](registry::ObjectRegistry) binds the globals the compositor advertises.
//! - [`SurfaceLifecycle`](surface::SurfaceLifecycle) acknowledges configures of the window.
//! - A [`Renderer`](render::Renderer) creates the render target once the first configure was acknowledged.
//! - [`InputDispatcher`](input::InputDispatcher) turns key presses into actions.
//! - [`OutputTracker`](output::OutputTracker) records monitor geometry.
//! - [`SessionNegotiator`](remote_session::SessionNegotiator) drives the remote desktop handshake.
//!
//! The client never talks to the display server directly. Requests go through the [`Transport`] trait, which is
//! implemented for a Wayland connection in [`wayland`]. [`run`] connects to the display server and drives the
//! client with a calloop event loop.

mod client;
mod config;
mod error;
mod event_loop;

pub mod input;
pub mod output;
pub mod registry;
pub mod render;
pub mod surface;
pub mod wayland;

#[cfg(test)]
mod testing;

pub use client::*;
pub use config::*;
pub use error::*;
pub use event_loop::{run, FrameClock};

pub use remote_session;
