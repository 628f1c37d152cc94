//! The layer stack decides which layer a key press resolves against: the most recently
//! pushed element wins, the base layer is used when the stack is empty.
//!
//! Elements are popped by id, not by position, so a layer key released out of order
//! removes its own element and leaves the others untouched.

use crate::error::Error;
use heapless::Vec;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Maximum number of elements on the stack. Pushing onto a full stack is rejected.
pub const MAX_LAYER_STACK_DEPTH: usize = 16;

/// Layer used while the stack is empty.
pub const BASE_LAYER: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayerElement {
    /// Handle used to pop the element again.
    pub id: u8,
    /// Layer activated while the element is on the stack.
    pub layer: u8,
}

#[derive(Debug, Default)]
pub struct LayerStack {
    // bottom first, insertion order is recency
    elements: Vec<LayerElement, MAX_LAYER_STACK_DEPTH>,
}

impl LayerStack {
    pub const fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    /// Push a new element on top. Elements with the same id may coexist.
    pub fn push(&mut self, id: u8, layer: u8) -> Result<(), Error> {
        self.push_at(0, id, layer)
    }

    /// Insert an element `offset` positions below the top. An offset past the bottom
    /// inserts at the bottom.
    pub fn push_at(&mut self, offset: usize, id: u8, layer: u8) -> Result<(), Error> {
        let index = self.elements.len().saturating_sub(offset);
        match self.elements.insert(index, LayerElement { id, layer }) {
            Ok(()) => {
                #[cfg(feature = "defmt")]
                trace!("push: id {} layer {} at {}", id, layer, index);
                Ok(())
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                warn!("layer stack full, dropping id {} layer {}", id, layer);
                Err(Error::LayerStackFull)
            }
        }
    }

    /// Remove the most recently pushed element with the given id.
    pub fn pop_id(&mut self, id: u8) -> Option<LayerElement> {
        let index = self.elements.iter().rposition(|e| e.id == id)?;

        #[cfg(feature = "defmt")]
        trace!("pop_id: id {} at {}", id, index);

        Some(self.elements.remove(index))
    }

    /// Offset from the top of the most recently pushed element with the given id.
    pub fn find_id(&self, id: u8) -> Option<usize> {
        self.elements
            .iter()
            .rev()
            .position(|e| e.id == id)
    }

    /// Element `offset` positions below the top.
    pub fn peek(&self, offset: usize) -> Option<LayerElement> {
        self.elements.iter().rev().nth(offset).copied()
    }

    pub fn current_layer(&self) -> u8 {
        self.elements.last().map_or(BASE_LAYER, |e| e.layer)
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Iterate from the bottom of the stack to the top.
    pub fn iter(&self) -> impl Iterator<Item = &LayerElement> {
        self.elements.iter()
    }
}
