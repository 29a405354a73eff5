//! Discovery and binding of the globals advertised by the compositor.

use std::ops::RangeInclusive;

use rustc_hash::FxHashMap;

use crate::error::{MissingGlobal, Setup};

/// Interfaces the client binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Compositor,
    WmBase,
    Seat,
    Output,
}

impl Interface {
    /// Interfaces the client cannot run without.
    pub const REQUIRED: [Interface; 2] = [Interface::Compositor, Interface::WmBase];

    pub fn from_name(name: &str) -> Option<Self> {
        let interface = match name {
            "wl_compositor" => Interface::Compositor,
            "xdg_wm_base" => Interface::WmBase,
            "wl_seat" => Interface::Seat,
            "wl_output" => Interface::Output,
            _ => return None,
        };

        Some(interface)
    }

    pub fn name(self) -> &'static str {
        match self {
            Interface::Compositor => "wl_compositor",
            Interface::WmBase => "xdg_wm_base",
            Interface::Seat => "wl_seat",
            Interface::Output => "wl_output",
        }
    }

    /// The versions of the interface the client understands.
    pub fn versions(self) -> RangeInclusive<u32> {
        match self {
            Interface::Compositor => 1..=4,
            Interface::WmBase => 1..=1,
            // Version 4 adds keyboard repeat info.
            Interface::Seat => 1..=4,
            // Version 2 adds the scale and done events.
            Interface::Output => 2..=3,
        }
    }

    /// The version to bind given the advertised version.
    ///
    /// Returns [`None`] if the advertised version is too old.
    pub fn negotiate(self, advertised: u32) -> Option<u32> {
        let versions = self.versions();

        if advertised < *versions.start() {
            return None;
        }

        Some(advertised.min(*versions.end()))
    }
}

/// A global advertised by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

impl Global {
    pub fn new(name: u32, interface: impl Into<String>, version: u32) -> Self {
        Self {
            name,
            interface: interface.into(),
            version,
        }
    }
}

/// Binds globals and the objects that depend on them.
///
/// Binding an object also attaches its event handling, so every bound object starts delivering events as soon
/// as the transport dispatches.
pub trait Binder {
    type Compositor;
    type WmBase;
    type Seat;
    type Pointer: std::fmt::Debug;
    type Keyboard: std::fmt::Debug;
    type Output;

    fn bind_compositor(&mut self, name: u32, version: u32) -> Self::Compositor;

    fn bind_wm_base(&mut self, name: u32, version: u32) -> Self::WmBase;

    fn bind_seat(&mut self, name: u32, version: u32) -> Self::Seat;

    fn subscribe_pointer(&mut self, seat: &Self::Seat) -> Self::Pointer;

    fn subscribe_keyboard(&mut self, seat: &Self::Seat) -> Self::Keyboard;

    fn bind_output(&mut self, name: u32, version: u32) -> Self::Output;
}

/// A bound global.
#[derive(Debug)]
pub struct Bound<H> {
    pub name: u32,
    pub version: u32,
    pub handle: H,
}

/// A bound global which was removed by the compositor.
#[derive(Debug)]
pub enum Removed<O> {
    /// The output is no longer tracked and should be released.
    Output(Bound<O>),

    /// A singleton global. Its object stays alive until the client exits.
    Kept(Interface),
}

/// Pointer and keyboard of the seat.
#[derive(Debug)]
pub struct SeatDevices<B: Binder> {
    pub pointer: B::Pointer,
    pub keyboard: B::Keyboard,
}

/// Every object the registry held, returned for release at shutdown.
#[derive(Debug)]
pub struct BoundGlobals<B: Binder> {
    pub compositor: Option<Bound<B::Compositor>>,
    pub wm_base: Option<Bound<B::WmBase>>,
    pub seat: Option<Bound<B::Seat>>,
    pub devices: Option<SeatDevices<B>>,
    pub outputs: Vec<Bound<B::Output>>,
}

/// Tracks advertised globals and owns the handles bound from them.
///
/// Each singleton interface is bound once; later advertisements of the same interface are ignored. Every
/// advertised output is bound.
#[derive(Debug)]
pub struct ObjectRegistry<B: Binder> {
    compositor: Option<Bound<B::Compositor>>,
    wm_base: Option<Bound<B::WmBase>>,
    seat: Option<Bound<B::Seat>>,
    devices: Option<SeatDevices<B>>,
    outputs: FxHashMap<u32, Bound<B::Output>>,
    bound: FxHashMap<u32, Interface>,
    incompatible: Vec<MissingGlobal>,
}

impl<B: Binder> Default for ObjectRegistry<B> {
    fn default() -> Self {
        Self {
            compositor: None,
            wm_base: None,
            seat: None,
            devices: None,
            outputs: FxHashMap::default(),
            bound: FxHashMap::default(),
            incompatible: Vec::new(),
        }
    }
}

impl<B: Binder> ObjectRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a global being advertised.
    ///
    /// Returns the interface if the global was bound.
    pub fn on_global(&mut self, binder: &mut B, global: &Global) -> Option<Interface> {
        tracing::debug!(
            interface = %global.interface,
            version = global.version,
            name = global.name,
            "Global advertised"
        );

        let interface = Interface::from_name(&global.interface)?;

        let Some(version) = interface.negotiate(global.version) else {
            tracing::warn!(
                interface = interface.name(),
                available = global.version,
                "Ignoring global with incompatible version"
            );

            self.incompatible.push(MissingGlobal::IncompatibleVersion {
                interface: interface.name(),
                available: global.version,
                compatible: interface.versions(),
            });

            return None;
        };

        let name = global.name;

        match interface {
            Interface::Compositor => {
                if self.compositor.is_some() {
                    return self.duplicate(interface, name);
                }

                let handle = binder.bind_compositor(name, version);
                self.compositor = Some(Bound { name, version, handle });
            }

            Interface::WmBase => {
                if self.wm_base.is_some() {
                    return self.duplicate(interface, name);
                }

                let handle = binder.bind_wm_base(name, version);
                self.wm_base = Some(Bound { name, version, handle });
            }

            Interface::Seat => {
                if self.seat.is_some() {
                    return self.duplicate(interface, name);
                }

                let handle = binder.bind_seat(name, version);

                // Only a single seat is used, so the devices are never recreated.
                self.devices = Some(SeatDevices {
                    pointer: binder.subscribe_pointer(&handle),
                    keyboard: binder.subscribe_keyboard(&handle),
                });
                self.seat = Some(Bound { name, version, handle });
            }

            Interface::Output => {
                let handle = binder.bind_output(name, version);
                self.outputs.insert(name, Bound { name, version, handle });
            }
        }

        tracing::debug!(interface = interface.name(), version, name, "Bound global");
        self.bound.insert(name, interface);

        Some(interface)
    }

    /// Handle a global being removed.
    ///
    /// Returns [`None`] if nothing was bound from the global.
    pub fn on_removed(&mut self, name: u32) -> Option<Removed<B::Output>> {
        let Some(interface) = self.bound.get(&name).copied() else {
            tracing::debug!(name, "Unused global removed");
            return None;
        };

        if interface != Interface::Output {
            tracing::warn!(interface = interface.name(), name, "Bound global removed");
            return Some(Removed::Kept(interface));
        }

        self.bound.remove(&name);
        let output = self.outputs.remove(&name)?;
        tracing::debug!(name, "Output removed");

        Some(Removed::Output(output))
    }

    /// Check the globals needed to run are bound.
    pub fn finish_discovery(&self) -> Result<(), Setup> {
        let missing = self.missing();

        if !missing.is_empty() {
            return Err(Setup::MissingGlobals(missing));
        }

        Ok(())
    }

    /// Required globals which are not bound.
    pub fn missing(&self) -> Vec<MissingGlobal> {
        Interface::REQUIRED
            .into_iter()
            .filter(|&interface| !self.is_bound(interface))
            .map(|interface| {
                // Prefer reporting a version mismatch over the global not existing.
                self.incompatible
                    .iter()
                    .find(|missing| {
                        matches!(missing, MissingGlobal::IncompatibleVersion { interface: name, .. } if *name == interface.name())
                    })
                    .cloned()
                    .unwrap_or(MissingGlobal::NotAvailable {
                        interface: interface.name(),
                    })
            })
            .collect()
    }

    pub fn is_bound(&self, interface: Interface) -> bool {
        match interface {
            Interface::Compositor => self.compositor.is_some(),
            Interface::WmBase => self.wm_base.is_some(),
            Interface::Seat => self.seat.is_some(),
            Interface::Output => !self.outputs.is_empty(),
        }
    }

    pub fn compositor(&self) -> Option<&B::Compositor> {
        self.compositor.as_ref().map(|bound| &bound.handle)
    }

    pub fn wm_base(&self) -> Option<&B::WmBase> {
        self.wm_base.as_ref().map(|bound| &bound.handle)
    }

    pub fn devices(&self) -> Option<&SeatDevices<B>> {
        self.devices.as_ref()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Give up every bound object.
    pub fn into_globals(self) -> BoundGlobals<B> {
        let mut outputs = self.outputs.into_values().collect::<Vec<_>>();
        outputs.sort_by_key(|output| output.name);

        BoundGlobals {
            compositor: self.compositor,
            wm_base: self.wm_base,
            seat: self.seat,
            devices: self.devices,
            outputs,
        }
    }

    fn duplicate(&self, interface: Interface, name: u32) -> Option<Interface> {
        tracing::debug!(interface = interface.name(), name, "Ignoring additional global");
        None
    }
}
