//! Layer keys built on the layer stack primitives of [`Keyboard`].

use crate::Keyboard;
use crate::error::Error;
use crate::layer_stack::LayerElement;
use crate::platform::Platform;

/// Cycles after releasing a [`DoubleTapLayer`] during which a second press activates the layer.
/// At a 5ms scan rate this is about 200ms.
pub const DOUBLE_TAP_WINDOW_CYCLES: u32 = 40;

/// A layer push/pop key. `id` and `layer` don't have to match, pops only look at the id.
///
/// Push only and pop only keys bind just [`LayerKey::press`] or [`LayerKey::release`] to
/// the key press and do nothing on the other transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerKey {
    pub id: u8,
    pub layer: u8,
}

impl LayerKey {
    pub const fn new(id: u8, layer: u8) -> Self {
        Self { id, layer }
    }

    pub fn press<T: Platform>(&self, keyboard: &mut Keyboard<T>) -> Result<(), Error> {
        keyboard.push_layer(self.id, self.layer)
    }

    pub fn release<T: Platform>(&self, keyboard: &mut Keyboard<T>) -> Option<LayerElement> {
        keyboard.pop_layer(self.id)
    }
}

/// What the key dispatch should do with the primary function of a [`DoubleTapLayer`] key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TapOutcome {
    /// Press or release the primary key (e.g. left control).
    Primary,
    /// The layer was pushed or popped, the primary key stays untouched.
    Layer,
}

/// Acts as its primary key on the first press. Pressing it again within
/// [`DOUBLE_TAP_WINDOW_CYCLES`] of the release holds the layer instead until released.
#[derive(Debug, Clone)]
pub struct DoubleTapLayer {
    key: LayerKey,
    window: u32,
    presses: u8,
    released_at: Option<u32>,
}

impl DoubleTapLayer {
    pub const fn new(key: LayerKey) -> Self {
        Self::with_window(key, DOUBLE_TAP_WINDOW_CYCLES)
    }

    pub const fn with_window(key: LayerKey, window: u32) -> Self {
        Self {
            key,
            window,
            presses: 0,
            released_at: None,
        }
    }

    pub fn press<T: Platform>(&mut self, keyboard: &mut Keyboard<T>) -> Result<TapOutcome, Error> {
        if let Some(released_at) = self.released_at.take() {
            if keyboard.cycle().wrapping_sub(released_at) > self.window {
                self.presses = 0;
            }
        }

        self.presses = self.presses.saturating_add(1);
        if self.presses == 1 {
            return Ok(TapOutcome::Primary);
        }

        self.key.press(keyboard)?;
        Ok(TapOutcome::Layer)
    }

    pub fn release<T: Platform>(&mut self, keyboard: &mut Keyboard<T>) -> TapOutcome {
        if self.presses <= 1 {
            self.released_at = Some(keyboard.cycle());
            return TapOutcome::Primary;
        }

        self.key.release(keyboard);
        self.presses = 0;
        TapOutcome::Layer
    }
}
