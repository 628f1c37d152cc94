//! The non-volatile byte store: a flat, byte addressable space on top of a [`Platform`].
//!
//! Writes are synchronous and go to the platform in call order, so writes issued by
//! [`ByteStore::write`] and [`ByteStore::copy`] are totally ordered. Every write reads the
//! cell first and skips the physical write if nothing changes.

use crate::error::Error;
use crate::platform::{ERASED, Platform};
#[cfg(feature = "defmt")]
use defmt::trace;

/// Counters of what the store did with the writes it was asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteStatistics {
    /// Bytes physically programmed.
    pub written: u32,
    /// Bytes cleared back to the erased state.
    pub erased: u32,
    /// Writes suppressed because the cell already held the value.
    pub skipped: u32,
}

pub struct ByteStore<T: Platform> {
    pub(crate) hal: T,
    capacity: u32,
    statistics: WriteStatistics,
}

impl<T: Platform> ByteStore<T> {
    pub fn new(hal: T) -> Self {
        let capacity = u32::try_from(hal.capacity()).unwrap_or(u32::MAX);
        Self {
            hal,
            capacity,
            statistics: WriteStatistics::default(),
        }
    }

    /// Size of the addressable space in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn statistics(&self) -> WriteStatistics {
        self.statistics
    }

    pub fn hal(&self) -> &T {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut T {
        &mut self.hal
    }

    /// Gives the platform back, e.g. to reopen it with a different geometry.
    pub fn release(self) -> T {
        self.hal
    }

    /// Read the byte at `address`.
    pub fn read(&mut self, address: u32) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_slice(address, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_slice(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.check_range(address, buf.len())?;

        #[cfg(feature = "debug-logs")]
        println!("  ByteStore: read  @{:#06x}[{}]", address, buf.len());

        self.hal
            .read(address, buf)
            .map_err(|_| Error::EepromError)
    }

    /// Write a single byte. The current value is read first and the write is skipped if it
    /// is unchanged; writing [`ERASED`] clears the cell instead of programming it.
    pub fn write(&mut self, address: u32, data: u8) -> Result<(), Error> {
        let current = self.read(address)?;
        if current == data {
            self.statistics.skipped += 1;
            return Ok(());
        }

        #[cfg(feature = "defmt")]
        trace!("write: @{=u32:#x} {=u8:#x} -> {=u8:#x}", address, current, data);

        #[cfg(feature = "debug-logs")]
        println!("  ByteStore: write @{:#06x} {:#04x} -> {:#04x}", address, current, data);

        if data == ERASED {
            self.hal
                .erase_byte(address)
                .map_err(|_| Error::EepromError)?;
            self.statistics.erased += 1;
        } else {
            self.hal
                .write(address, &[data])
                .map_err(|_| Error::EepromError)?;
            self.statistics.written += 1;
        }
        Ok(())
    }

    /// Write `data` starting at `address`, one byte at a time in ascending order.
    pub fn write_slice(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.check_range(address, data.len())?;
        for (address, &byte) in (address..).zip(data) {
            self.write(address, byte)?;
        }
        Ok(())
    }

    /// Copy `length` bytes from `from` to `to`. Overlapping ranges are handled like a
    /// memmove: ascending when `to < from`, descending when `to > from`.
    pub fn copy(&mut self, to: u32, from: u32, length: usize) -> Result<(), Error> {
        if to == from || length == 0 {
            return Ok(());
        }
        self.check_range(to, length)?;
        self.check_range(from, length)?;

        #[cfg(feature = "defmt")]
        trace!("copy: @{=u32:#x} -> @{=u32:#x} [{}]", from, to, length);

        // length fits into u32, check_range verified it against the capacity
        let length = length as u32;
        if to < from {
            for i in 0..length {
                let byte = self.read(from + i)?;
                self.write(to + i, byte)?;
            }
        } else {
            for i in (0..length).rev() {
                let byte = self.read(from + i)?;
                self.write(to + i, byte)?;
            }
        }
        Ok(())
    }

    fn check_range(&self, address: u32, length: usize) -> Result<(), Error> {
        let length = u32::try_from(length).map_err(|_| Error::InvalidAddress)?;
        match address.checked_add(length) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Error::InvalidAddress),
        }
    }
}
