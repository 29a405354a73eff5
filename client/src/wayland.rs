//! The Wayland implementation of [`Transport`].
//!
//! Each protocol object's events are translated into the client's event types here. Nothing in this module
//! decides what an event means.

use remote_session::PortalBroker;
use wayland_client::{
    globals::GlobalListContents,
    protocol::{
        wl_compositor::WlCompositor,
        wl_keyboard::{self, WlKeyboard},
        wl_output::{self, WlOutput},
        wl_pointer::{self, WlPointer},
        wl_registry::{self, WlRegistry},
        wl_seat::{self, WlSeat},
        wl_surface::{self, WlSurface},
    },
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};

use crate::{
    input::{ButtonState, InputEvent, KeyState},
    output::OutputEvent,
    registry::{Binder, Bound, BoundGlobals, Global},
    render::EglRenderer,
    surface::WindowEvent,
    Client, Transport,
};

/// The client as driven by a Wayland connection.
pub type App = Client<Wayland, EglRenderer, PortalBroker>;

/// Requests go out through the registry of the connection, with events dispatched to the [`App`] queue.
#[derive(Debug)]
pub struct Wayland {
    conn: Connection,
    registry: WlRegistry,
    qh: QueueHandle<App>,
}

impl Wayland {
    pub fn new(conn: Connection, registry: WlRegistry, qh: QueueHandle<App>) -> Self {
        Self { conn, registry, qh }
    }
}

/// The protocol objects making up the window.
#[derive(Debug)]
pub struct WaylandWindow {
    pub surface: WlSurface,
    pub xdg_surface: XdgSurface,
    pub toplevel: XdgToplevel,
}

impl Binder for Wayland {
    type Compositor = WlCompositor;
    type WmBase = XdgWmBase;
    type Seat = WlSeat;
    type Pointer = WlPointer;
    type Keyboard = WlKeyboard;
    type Output = WlOutput;

    fn bind_compositor(&mut self, name: u32, version: u32) -> WlCompositor {
        self.registry.bind(name, version, &self.qh, ())
    }

    fn bind_wm_base(&mut self, name: u32, version: u32) -> XdgWmBase {
        self.registry.bind(name, version, &self.qh, ())
    }

    fn bind_seat(&mut self, name: u32, version: u32) -> WlSeat {
        self.registry.bind(name, version, &self.qh, ())
    }

    fn subscribe_pointer(&mut self, seat: &WlSeat) -> WlPointer {
        seat.get_pointer(&self.qh, ())
    }

    fn subscribe_keyboard(&mut self, seat: &WlSeat) -> WlKeyboard {
        seat.get_keyboard(&self.qh, ())
    }

    fn bind_output(&mut self, name: u32, version: u32) -> WlOutput {
        // The global name identifies the output in the tracker.
        self.registry.bind(name, version, &self.qh, name)
    }
}

impl Transport for Wayland {
    type Window = WaylandWindow;

    fn create_window(&mut self, compositor: &WlCompositor, wm_base: &XdgWmBase, title: &str) -> WaylandWindow {
        let surface = compositor.create_surface(&self.qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, ());
        let toplevel = xdg_surface.get_toplevel(&self.qh, ());
        toplevel.set_title(title.into());
        surface.commit();

        WaylandWindow {
            surface,
            xdg_surface,
            toplevel,
        }
    }

    fn ack_configure(&mut self, window: &WaylandWindow, serial: u32) {
        window.xdg_surface.ack_configure(serial);
    }

    fn pong(&mut self, wm_base: &XdgWmBase, serial: u32) {
        wm_base.pong(serial);
    }

    fn destroy_window(&mut self, window: WaylandWindow) {
        window.toplevel.destroy();
        window.xdg_surface.destroy();
        window.surface.destroy();
    }

    fn release_globals(&mut self, globals: BoundGlobals<Self>) {
        let BoundGlobals {
            wm_base,
            devices,
            outputs,
            ..
        } = globals;

        // The release requests only exist since version 3.
        if let Some(devices) = devices {
            if devices.pointer.version() >= 3 {
                devices.pointer.release();
            }

            if devices.keyboard.version() >= 3 {
                devices.keyboard.release();
            }
        }

        for output in outputs {
            self.release_output(output);
        }

        if let Some(wm_base) = wm_base {
            wm_base.handle.destroy();
        }
    }

    fn release_output(&mut self, output: Bound<WlOutput>) {
        // Only since version 3, older objects are left to the disconnect.
        if output.version >= 3 {
            output.handle.release();
        }
    }

    fn disconnect(&mut self) {
        if let Err(err) = self.conn.flush() {
            tracing::warn!("Failed to flush the connection: {err}");
        }
    }
}

fn raw<T: Into<u32>>(value: WEnum<T>) -> u32 {
    match value {
        WEnum::Value(value) => value.into(),
        WEnum::Unknown(raw) => raw,
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for App {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.handle_global(&Global::new(name, interface, version)),

            wl_registry::Event::GlobalRemove { name } => state.handle_global_remove(name),

            _ => (),
        }
    }
}

impl Dispatch<WlCompositor, ()> for App {
    fn event(
        _state: &mut Self,
        _proxy: &WlCompositor,
        _event: <WlCompositor as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlSurface, ()> for App {
    fn event(
        _state: &mut Self,
        _surface: &WlSurface,
        event: wl_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_surface::Event::Enter { output } => tracing::debug!(output = %output.id(), "Surface entered output"),
            wl_surface::Event::Leave { output } => tracing::debug!(output = %output.id(), "Surface left output"),
            _ => (),
        }
    }
}

impl Dispatch<XdgWmBase, ()> for App {
    fn event(
        state: &mut Self,
        _wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            state.handle_ping(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for App {
    fn event(
        state: &mut Self,
        _xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.handle_window_event(WindowEvent::Configure { serial });
        }
    }
}

impl Dispatch<XdgToplevel, ()> for App {
    fn event(
        state: &mut Self,
        _toplevel: &XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state.handle_window_event(WindowEvent::ToplevelConfigure { width, height });
            }

            xdg_toplevel::Event::Close => state.handle_window_event(WindowEvent::Close),

            _ => (),
        }
    }
}

impl Dispatch<WlSeat, ()> for App {
    fn event(
        _state: &mut Self,
        _seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities { capabilities } => {
                tracing::debug!(?capabilities, "Seat capabilities");
            }

            wl_seat::Event::Name { name } => tracing::debug!(name = %name, "Seat name"),

            _ => (),
        }
    }
}

impl Dispatch<WlPointer, ()> for App {
    fn event(
        state: &mut Self,
        _pointer: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let event = match event {
            wl_pointer::Event::Enter {
                serial,
                surface_x,
                surface_y,
                ..
            } => InputEvent::PointerEnter {
                serial,
                x: surface_x,
                y: surface_y,
            },

            wl_pointer::Event::Leave { serial, .. } => InputEvent::PointerLeave { serial },

            wl_pointer::Event::Motion {
                time,
                surface_x,
                surface_y,
            } => InputEvent::PointerMotion {
                time,
                x: surface_x,
                y: surface_y,
            },

            wl_pointer::Event::Button {
                serial,
                time,
                button,
                state: button_state,
            } => {
                let button_state = match button_state {
                    WEnum::Value(wl_pointer::ButtonState::Pressed) => ButtonState::Pressed,
                    WEnum::Value(wl_pointer::ButtonState::Released) => ButtonState::Released,
                    other => {
                        tracing::warn!(state = raw(other), "Unknown button state");
                        return;
                    }
                };

                InputEvent::PointerButton {
                    serial,
                    time,
                    button,
                    state: button_state,
                }
            }

            // Axis and frame events are not used.
            _ => return,
        };

        state.handle_input(event);
    }
}

impl Dispatch<WlKeyboard, ()> for App {
    fn event(
        state: &mut Self,
        _keyboard: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let event = match event {
            // The keymap file descriptor is closed when it is dropped here.
            wl_keyboard::Event::Keymap { format, size, .. } => InputEvent::Keymap {
                format: raw(format),
                size,
            },

            wl_keyboard::Event::Enter { serial, .. } => InputEvent::KeyboardEnter { serial },

            wl_keyboard::Event::Leave { serial, .. } => InputEvent::KeyboardLeave { serial },

            wl_keyboard::Event::Key {
                serial,
                time,
                key,
                state: key_state,
            } => {
                let key_state = match key_state {
                    WEnum::Value(wl_keyboard::KeyState::Pressed) => KeyState::Pressed,
                    WEnum::Value(wl_keyboard::KeyState::Released) => KeyState::Released,
                    other => {
                        tracing::warn!(state = raw(other), "Unknown key state");
                        return;
                    }
                };

                InputEvent::Key {
                    serial,
                    time,
                    key,
                    state: key_state,
                }
            }

            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => InputEvent::Modifiers {
                depressed: mods_depressed,
                latched: mods_latched,
                locked: mods_locked,
                group,
            },

            wl_keyboard::Event::RepeatInfo { rate, delay } => InputEvent::RepeatInfo { rate, delay },

            _ => return,
        };

        state.handle_input(event);
    }
}

impl Dispatch<WlOutput, u32> for App {
    fn event(
        state: &mut Self,
        _output: &WlOutput,
        event: wl_output::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let event = match event {
            wl_output::Event::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                subpixel,
                make,
                model,
                transform,
            } => OutputEvent::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                subpixel: raw(subpixel),
                make,
                model,
                transform: raw(transform),
            },

            wl_output::Event::Mode {
                flags,
                width,
                height,
                refresh,
            } => {
                let flags = match flags {
                    WEnum::Value(flags) => flags,
                    WEnum::Unknown(raw) => wl_output::Mode::from_bits_truncate(raw),
                };

                OutputEvent::Mode {
                    current: flags.contains(wl_output::Mode::Current),
                    preferred: flags.contains(wl_output::Mode::Preferred),
                    width,
                    height,
                    refresh,
                }
            }

            wl_output::Event::Scale { factor } => OutputEvent::Scale { factor },

            wl_output::Event::Done => OutputEvent::Done,

            _ => return,
        };

        state.handle_output(*name, event);
    }
}
