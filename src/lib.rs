#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod eeprom;
pub mod error;
pub mod keys;
pub mod layer_stack;
pub mod macros;
pub mod platform;
mod raw;
pub mod recorder;

pub use raw::{Action, Geometry, MAX_MATRIX_DIMENSION, MAX_TABLE_LAYER, Uid, VERSION};
pub use recorder::{KeyDispatch, MAX_PLAYBACK_DEPTH, RecorderState};

extern crate alloc;

use crate::error::Error;
use crate::layer_stack::{LayerElement, LayerStack};
use crate::macros::MacroStore;
use crate::platform::Platform;
#[cfg(feature = "defmt")]
use defmt::trace;

/// The Keyboard struct owns every piece of process wide state of the firmware core: the
/// layer stack, the macro store and the recorder. The scan loop keeps exactly one of them
/// and drives it once per matrix scan cycle.
pub struct Keyboard<T: Platform> {
    pub(crate) layers: LayerStack,
    pub(crate) macros: MacroStore<T>,
    pub(crate) recorder: RecorderState,
    tick_keypresses: bool,
    cycle: u32,
}

impl<T: Platform> Keyboard<T> {
    /// Opens the macro store on `hal` and starts with an empty layer stack.
    ///
    /// A persisted image written for a different geometry or layout version is discarded,
    /// see [`MacroStore::reinitialized`].
    pub fn new(hal: T, geometry: Geometry) -> Result<Keyboard<T>, Error> {
        let macros = MacroStore::new(hal, geometry)?;
        Ok(Self {
            layers: LayerStack::new(),
            macros,
            recorder: RecorderState::Idle,
            tick_keypresses: true,
            cycle: 0,
        })
    }

    /// Starts a new scan cycle: advances the tick counter and re-arms keystroke repetition.
    pub fn begin_cycle(&mut self) {
        self.cycle = self.cycle.wrapping_add(1);
        self.tick_keypresses = true;
    }

    /// Monotonic scan cycle counter, wraps around.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Whether the key dispatch may repeat the last keystroke in this cycle. Cleared by
    /// every layer change.
    pub fn tick_keypresses(&self) -> bool {
        self.tick_keypresses
    }

    pub fn suppress_tick_keypresses(&mut self) {
        self.tick_keypresses = false;
    }

    /// Push a layer element. The push counts as a layer change even if the stack is full.
    pub fn push_layer(&mut self, id: u8, layer: u8) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("push_layer: id {} layer {}", id, layer);

        self.tick_keypresses = false;
        self.layers.push(id, layer)
    }

    /// Pop the most recently pushed element with `id`.
    pub fn pop_layer(&mut self, id: u8) -> Option<LayerElement> {
        #[cfg(feature = "defmt")]
        trace!("pop_layer: id {}", id);

        self.tick_keypresses = false;
        self.layers.pop_id(id)
    }

    pub fn current_layer(&self) -> u8 {
        self.layers.current_layer()
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// Raw access to the stack, e.g. for timers. Changes made here leave the keystroke
    /// repetition flag alone.
    pub fn layers_mut(&mut self) -> &mut LayerStack {
        &mut self.layers
    }

    pub fn macros(&self) -> &MacroStore<T> {
        &self.macros
    }

    pub fn macros_mut(&mut self) -> &mut MacroStore<T> {
        &mut self.macros
    }

    pub fn release(self) -> T {
        self.macros.release()
    }
}
