//! Monitor information accumulated from output events.

use euclid::{Point2D, Size2D};
use rustc_hash::FxHashMap;

/// Coordinate space of the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logical;

/// Physical dimensions in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Millimeters;

/// Events describing an output.
///
/// Geometry, mode and scale may arrive in any order. A `Done` marks the record consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Geometry {
        x: i32,
        y: i32,
        physical_width: i32,
        physical_height: i32,
        subpixel: u32,
        make: String,
        model: String,
        transform: u32,
    },

    Mode {
        current: bool,
        preferred: bool,
        width: i32,
        height: i32,
        /// Refresh rate in mHz.
        refresh: i32,
    },

    Scale { factor: i32 },

    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub size: Size2D<i32, Logical>,
    /// Refresh rate in mHz.
    pub refresh: i32,
    pub preferred: bool,
}

/// What is known about a monitor.
///
/// Fields are updated as events arrive and may be read at any time, but only describe one consistent state of
/// the monitor while [`OutputInfo::is_consistent`] is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub position: Point2D<i32, Logical>,
    pub physical_size: Size2D<i32, Millimeters>,
    pub make: String,
    pub model: String,
    pub subpixel: u32,
    pub transform: u32,
    pub mode: Option<Mode>,
    pub scale: i32,
    done: bool,
    dirty: bool,
}

impl Default for OutputInfo {
    fn default() -> Self {
        Self {
            position: Point2D::zero(),
            physical_size: Size2D::zero(),
            make: String::new(),
            model: String::new(),
            subpixel: 0,
            transform: 0,
            mode: None,
            scale: 1,
            done: false,
            dirty: false,
        }
    }
}

impl OutputInfo {
    /// Whether every update since the last done event was received.
    pub fn is_consistent(&self) -> bool {
        self.done && !self.dirty
    }
}

/// Tracks every output by the name of its global.
#[derive(Debug, Default)]
pub struct OutputTracker {
    outputs: FxHashMap<u32, OutputInfo>,
}

impl OutputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a newly bound output.
    pub fn insert(&mut self, name: u32) {
        self.outputs.entry(name).or_default();
    }

    /// Apply an event to the output.
    ///
    /// Events for outputs which are not tracked, such as ones still queued after the output was removed, are
    /// dropped. Returns true if the event made the record consistent.
    pub fn handle(&mut self, name: u32, event: OutputEvent) -> bool {
        let Some(info) = self.outputs.get_mut(&name) else {
            tracing::debug!(name, ?event, "Dropping event for an untracked output");
            return false;
        };

        match event {
            OutputEvent::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                subpixel,
                make,
                model,
                transform,
            } => {
                tracing::debug!(
                    name,
                    x,
                    y,
                    physical_width,
                    physical_height,
                    make = %make,
                    model = %model,
                    "Output geometry"
                );

                info.position = Point2D::new(x, y);
                info.physical_size = Size2D::new(physical_width, physical_height);
                info.subpixel = subpixel;
                info.transform = transform;
                info.make = make;
                info.model = model;
            }

            OutputEvent::Mode {
                current,
                preferred,
                width,
                height,
                refresh,
            } => {
                tracing::debug!(name, width, height, refresh, current, preferred, "Output mode");

                // Only the current mode describes the monitor, the others are merely supported.
                if !current {
                    return false;
                }

                info.mode = Some(Mode {
                    size: Size2D::new(width, height),
                    refresh,
                    preferred,
                });
            }

            OutputEvent::Scale { factor } => {
                tracing::debug!(name, factor, "Output scale");
                info.scale = factor;
            }

            OutputEvent::Done => {
                info.done = true;
                info.dirty = false;
                return true;
            }
        }

        info.dirty = true;
        false
    }

    pub fn get(&self, name: u32) -> Option<&OutputInfo> {
        self.outputs.get(&name)
    }

    pub fn remove(&mut self, name: u32) -> Option<OutputInfo> {
        self.outputs.remove(&name)
    }

    /// Outputs whose records are consistent, ordered by global name.
    pub fn consistent(&self) -> Vec<(u32, &OutputInfo)> {
        let mut outputs = self
            .outputs
            .iter()
            .filter(|(_, info)| info.is_consistent())
            .map(|(&name, info)| (name, info))
            .collect::<Vec<_>>();

        outputs.sort_by_key(|&(name, _)| name);
        outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
