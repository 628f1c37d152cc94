//! Byte exact layout of the persisted image.
//!
//! ```text
//! offset                          size            field
//! 0                               8               meta.version (rotating marker)
//! 8                               1               table.rows
//! 9                               1               table.columns
//! 10                              rows * columns  table.data, one existence byte per key
//! 10 + rows * columns             1               macros.length (slot count)
//! 11 + rows * columns             4 * length      macros.data
//! ```
//!
//! Nothing here relies on the in-memory representation of a Rust type; every field is
//! packed and unpacked by hand, multi byte values are little endian.

use crate::error::Error;

/// Width of one slot in the macro data region. Headers and actions share it.
pub(crate) const SLOT_SIZE: usize = 4;
pub(crate) const META_SIZE: usize = 8;
const TABLE_HEADER_SIZE: usize = 2;
const MACROS_LENGTH_SIZE: usize = 1;

/// Version of the persisted layout.
///
/// - 0x00: reserved, image is in an inconsistent state
/// - 0x01: first version
/// - 0xFF: reserved, image was never initialized
pub const VERSION: u8 = 0x01;
pub(crate) const VERSION_INCONSISTENT: u8 = 0x00;
pub(crate) const VERSION_UNINITIALIZED: u8 = 0xFF;

/// Rows, columns and uid layers are packed with 5 bits each.
pub const MAX_MATRIX_DIMENSION: u8 = 32;
/// The existence table has one bit per layer; uids above this layer are always scanned.
pub const MAX_TABLE_LAYER: u8 = 7;

const UID_FIELD_BITS: u16 = 5;
const UID_FIELD_MASK: u16 = (1 << UID_FIELD_BITS) - 1;
const UID_RESERVED_BIT: u16 = 1 << 15;

/// Where the image lives and which board matrix it describes. The board dimensions
/// and the resulting slot count are part of the persisted fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    /// First byte of the image inside the byte store.
    pub offset: u32,
    /// Number of bytes reserved for the image.
    pub size: u32,
    pub rows: u8,
    pub columns: u8,
}

impl Geometry {
    /// The ErgoDox: 1024 bytes of ATmega32U4 EEPROM and a 6x14 matrix.
    pub const ERGODOX: Geometry = Geometry::new(0, 1024, 6, 14);

    pub const fn new(offset: u32, size: u32, rows: u8, columns: u8) -> Self {
        Self {
            offset,
            size,
            rows,
            columns,
        }
    }
}

/// Absolute addresses of every field for one validated [`Geometry`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    base: u32,
    pub(crate) rows: u8,
    pub(crate) columns: u8,
    pub(crate) slot_count: u8,
}

impl Layout {
    pub(crate) fn new(geometry: &Geometry, capacity: u32) -> Result<Self, Error> {
        if !(1..=MAX_MATRIX_DIMENSION).contains(&geometry.rows)
            || !(1..=MAX_MATRIX_DIMENSION).contains(&geometry.columns)
        {
            return Err(Error::InvalidGeometry);
        }

        match geometry.offset.checked_add(geometry.size) {
            Some(end) if end <= capacity => {}
            _ => return Err(Error::InvalidGeometry),
        }

        let fixed = META_SIZE
            + TABLE_HEADER_SIZE
            + geometry.rows as usize * geometry.columns as usize
            + MACROS_LENGTH_SIZE;
        let slots = (geometry.size as usize)
            .checked_sub(fixed)
            .ok_or(Error::InvalidGeometry)?
            / SLOT_SIZE;

        // a macro needs at least a header and one action
        if slots < 2 {
            return Err(Error::InvalidGeometry);
        }

        Ok(Self {
            base: geometry.offset,
            rows: geometry.rows,
            columns: geometry.columns,
            // the length field is a single byte, anything beyond stays unused
            slot_count: slots.min(u8::MAX as usize) as u8,
        })
    }

    pub(crate) fn meta(&self, index: u8) -> u32 {
        self.base + index as u32
    }

    pub(crate) fn table_rows(&self) -> u32 {
        self.base + META_SIZE as u32
    }

    pub(crate) fn table_columns(&self) -> u32 {
        self.table_rows() + 1
    }

    pub(crate) fn table_data(&self) -> u32 {
        self.base + (META_SIZE + TABLE_HEADER_SIZE) as u32
    }

    pub(crate) fn table_len(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    pub(crate) fn cell(&self, row: u8, column: u8) -> u32 {
        self.table_data() + row as u32 * self.columns as u32 + column as u32
    }

    pub(crate) fn macros_length(&self) -> u32 {
        self.table_data() + self.table_len() as u32
    }

    pub(crate) fn slot(&self, index: usize) -> u32 {
        self.macros_length() + (MACROS_LENGTH_SIZE + index * SLOT_SIZE) as u32
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count as usize
    }

    /// True if the uid addresses a key inside the matrix.
    pub(crate) fn contains(&self, uid: &Uid) -> bool {
        uid.row < self.rows && uid.column < self.columns
    }
}

#[derive(strum::FromRepr, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub(crate) enum SlotType {
    // Only `length` is meaningful, the space is reclaimed by compaction.
    Deleted = 0x00,
    Valid = 0x01,
    // Erased state, marks the write cursor.
    NonExistent = 0xFF,
}

/// Identifies the key (and the layer it was on) a macro is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uid {
    pub row: u8,
    pub column: u8,
    pub layer: u8,
}

impl Uid {
    pub const fn new(row: u8, column: u8, layer: u8) -> Self {
        Self { row, column, layer }
    }

    pub(crate) fn pack(&self) -> Result<u16, Error> {
        if self.row >= MAX_MATRIX_DIMENSION
            || self.column >= MAX_MATRIX_DIMENSION
            || self.layer >= MAX_MATRIX_DIMENSION
        {
            return Err(Error::InvalidUid);
        }
        Ok(self.column as u16
            | (self.row as u16) << UID_FIELD_BITS
            | (self.layer as u16) << (2 * UID_FIELD_BITS)
            | UID_RESERVED_BIT)
    }

    pub(crate) fn unpack(raw: u16) -> Self {
        Self {
            column: (raw & UID_FIELD_MASK) as u8,
            row: ((raw >> UID_FIELD_BITS) & UID_FIELD_MASK) as u8,
            layer: ((raw >> (2 * UID_FIELD_BITS)) & UID_FIELD_MASK) as u8,
        }
    }
}

/// One recorded key transition. The layer is not stored: playback goes through the
/// live key dispatch, which resolves it against the current layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Action {
    pub pressed: bool,
    pub row: u8,
    pub column: u8,
}

impl Action {
    pub const fn new(pressed: bool, row: u8, column: u8) -> Self {
        Self {
            pressed,
            row,
            column,
        }
    }

    pub const fn press(row: u8, column: u8) -> Self {
        Self::new(true, row, column)
    }

    pub const fn release(row: u8, column: u8) -> Self {
        Self::new(false, row, column)
    }

    pub(crate) fn to_slot(self) -> [u8; SLOT_SIZE] {
        [self.pressed as u8, self.row, self.column, 0xFF]
    }

    pub(crate) fn from_slot(raw: &[u8; SLOT_SIZE]) -> Self {
        Self {
            pressed: raw[0] & 0x01 != 0,
            row: raw[1],
            column: raw[2],
        }
    }
}

/// Precedes `length` action slots in the macro data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) type_: SlotType,
    pub(crate) length: u8,
    pub(crate) uid: Uid,
}

impl Header {
    pub(crate) fn to_slot(self) -> Result<[u8; SLOT_SIZE], Error> {
        let [lo, hi] = self.uid.pack()?.to_le_bytes();
        Ok([self.type_ as u8, self.length, lo, hi])
    }

    pub(crate) fn from_slot(raw: &[u8; SLOT_SIZE]) -> Result<Self, Error> {
        let type_ = SlotType::from_repr(raw[0]).ok_or(Error::CorruptedData)?;
        Ok(Self {
            type_,
            length: raw[1],
            uid: Uid::unpack(u16::from_le_bytes([raw[2], raw[3]])),
        })
    }

    /// Number of slots the macro occupies, header included.
    pub(crate) fn span(&self) -> usize {
        1 + self.length as usize
    }
}

/// Decoded state of the rotating version marker in `meta.version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    Uninitialized,
    Inconsistent,
    Version { index: u8, version: u8 },
}

impl Marker {
    /// Exactly one byte may hold a version, the others have to be erased. A zero byte
    /// means a multi step update was interrupted.
    pub(crate) fn parse(meta: &[u8; META_SIZE]) -> Self {
        if meta.contains(&VERSION_INCONSISTENT) {
            return Marker::Inconsistent;
        }

        let mut marker = Marker::Uninitialized;
        for (index, &byte) in meta.iter().enumerate() {
            if byte == VERSION_UNINITIALIZED {
                continue;
            }
            if marker != Marker::Uninitialized {
                return Marker::Inconsistent;
            }
            marker = Marker::Version {
                index: index as u8,
                version: byte,
            };
        }
        marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_packing_keeps_every_field() {
        let uid = Uid::new(5, 13, 9);
        let raw = uid.pack().unwrap();
        assert_eq!(Uid::unpack(raw), uid);
        assert_eq!(raw & 0x8000, 0x8000);
    }

    #[test]
    fn uid_out_of_range() {
        assert_eq!(Uid::new(32, 0, 0).pack(), Err(Error::InvalidUid));
        assert_eq!(Uid::new(0, 0, 40).pack(), Err(Error::InvalidUid));
    }

    #[test]
    fn unknown_header_type() {
        assert_eq!(
            Header::from_slot(&[0x42, 0, 0, 0]),
            Err(Error::CorruptedData)
        );
    }

    #[test]
    fn marker() {
        let mut meta = [0xFFu8; META_SIZE];
        assert_eq!(Marker::parse(&meta), Marker::Uninitialized);

        meta[3] = VERSION;
        assert_eq!(
            Marker::parse(&meta),
            Marker::Version {
                index: 3,
                version: VERSION
            }
        );

        meta[4] = VERSION;
        assert_eq!(Marker::parse(&meta), Marker::Inconsistent);

        meta[4] = 0xFF;
        meta[3] = VERSION_INCONSISTENT;
        assert_eq!(Marker::parse(&meta), Marker::Inconsistent);
    }

    #[test]
    fn ergodox_layout() {
        let layout = Layout::new(&Geometry::ERGODOX, 1024).unwrap();
        assert_eq!(layout.table_data(), 10);
        assert_eq!(layout.macros_length(), 94);
        assert_eq!(layout.slot(0), 95);
        // (1024 - 8 - 2 - 84 - 1) / 4
        assert_eq!(layout.slot_count, 232);
    }

    #[test]
    fn geometry_validation() {
        assert!(Layout::new(&Geometry::new(0, 1024, 0, 14), 1024).is_err());
        assert!(Layout::new(&Geometry::new(0, 1024, 6, 33), 1024).is_err());
        assert!(Layout::new(&Geometry::new(512, 1024, 6, 14), 1024).is_err());
        assert!(Layout::new(&Geometry::new(0, 100, 6, 14), 1024).is_err());
    }
}
