use embedded_storage::{ReadStorage, Storage};

/// Value of an erased EEPROM cell. Writing it degrades to a pure clear.
pub const ERASED: u8 = 0xFF;

/// See README.md for an example implementation.
pub trait Platform: ByteErase + Storage {}

impl<T: ByteErase + Storage> Platform for T {}

/// Erase-only access to a single cell. AVR style EEPROMs can clear a byte back to
/// [`ERASED`] without programming it, which is both faster and gentler on the cell.
pub trait ByteErase: ReadStorage {
    fn erase_byte(&mut self, offset: u32) -> Result<(), Self::Error>;
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
mod chip {
    use crate::platform::{ByteErase, ERASED};
    use embedded_storage::{ReadStorage, Storage};
    use esp_storage::{FlashStorage, FlashStorageError};

    /// Emulates a byte addressable EEPROM on a window of the ESP flash. `FlashStorage`
    /// performs the sector read-modify-write cycle for every byte.
    pub struct EspEeprom<'d> {
        inner: FlashStorage<'d>,
        base_address: u32,
        size: u32,
    }

    impl<'d> EspEeprom<'d> {
        pub fn new(inner: FlashStorage<'d>, base_address: u32, size: u32) -> Self {
            Self {
                inner,
                base_address,
                size,
            }
        }
    }

    impl ReadStorage for EspEeprom<'_> {
        type Error = FlashStorageError;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            self.inner.read(self.base_address + offset, bytes)
        }

        fn capacity(&self) -> usize {
            self.size as usize
        }
    }

    impl Storage for EspEeprom<'_> {
        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            self.inner.write(self.base_address + offset, bytes)
        }
    }

    impl ByteErase for EspEeprom<'_> {
        fn erase_byte(&mut self, offset: u32) -> Result<(), Self::Error> {
            self.inner.write(self.base_address + offset, &[ERASED])
        }
    }
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
pub use chip::*;
