//! The macro store: a log structured table of variable length macros inside the byte store.
//!
//! Macros are appended at the write cursor as a header slot followed by `length` action
//! slots. Deleting only flips the header type, the space is reclaimed by [`MacroStore::compress`],
//! which shifts every surviving macro towards slot 0. The slot at the write cursor always
//! reads as `NonExistent` and terminates every walk over the data region.
//!
//! Recording is write through: actions land right behind the reserved header slot, and
//! only [`MacroStore::finalize`] makes them visible by writing the header. Multi step
//! updates are bracketed by the rotating version marker, a torn update is detected on the
//! next start and the image is re-initialised. Durability is best effort, not transactional.

use crate::eeprom::ByteStore;
use crate::error::Error;
use crate::platform::{ERASED, Platform};
use crate::raw::{
    Action, Geometry, Header, Layout, MAX_TABLE_LAYER, META_SIZE, Marker, SLOT_SIZE, SlotType,
    Uid, VERSION, VERSION_INCONSISTENT,
};
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacroStatistics {
    /// Capacity of the macro data region in slots.
    pub slots: usize,
    pub valid_macros: usize,
    pub deleted_macros: usize,
    /// Slots held by valid macros, headers included.
    pub used_slots: usize,
    /// Slots held by deleted macros, reclaimable by compaction.
    pub deleted_slots: usize,
    /// Slots behind the write cursor.
    pub free_slots: usize,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    uid: Uid,
    length: u8,
}

pub struct MacroStore<T: Platform> {
    pub(crate) eeprom: ByteStore<T>,
    layout: Layout,
    marker_index: u8,
    // slot index of the next header, equals the slot count when the region is full
    cursor: usize,
    deleted_slots: usize,
    pending: Option<Pending>,
    reinitialized: bool,
}

impl<T: Platform> MacroStore<T> {
    /// Opens the image described by `geometry`. If the persisted fingerprint doesn't match,
    /// the image is torn or was never written, every macro is discarded and the image is
    /// initialized from scratch.
    pub fn new(hal: T, geometry: Geometry) -> Result<Self, Error> {
        let eeprom = ByteStore::new(hal);
        let layout = Layout::new(&geometry, eeprom.capacity())?;

        let mut store = Self {
            eeprom,
            layout,
            marker_index: 0,
            cursor: 0,
            deleted_slots: 0,
            pending: None,
            reinitialized: false,
        };

        match store.load() {
            Ok(()) => Ok(store),
            Err(Error::LayoutMismatch) | Err(Error::CorruptedData) => {
                #[cfg(feature = "defmt")]
                warn!("macro image unusable, re-initializing");

                store.initialize()?;
                store.reinitialized = true;
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    /// True if opening the store discarded whatever the image held before.
    pub fn reinitialized(&self) -> bool {
        self.reinitialized
    }

    /// Capacity of the macro data region in slots.
    pub fn slot_count(&self) -> usize {
        self.layout.slot_count()
    }

    pub fn is_recording(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of actions recorded so far in the current session.
    pub fn pending_len(&self) -> Option<u8> {
        self.pending.map(|p| p.length)
    }

    pub fn eeprom(&self) -> &ByteStore<T> {
        &self.eeprom
    }

    pub fn eeprom_mut(&mut self) -> &mut ByteStore<T> {
        &mut self.eeprom
    }

    pub fn release(self) -> T {
        self.eeprom.release()
    }

    /// Whether a macro is stored for `uid`. The existence table rejects most absent uids
    /// without touching the data region; a set bit only means "possibly", so the region is
    /// scanned to confirm.
    pub fn exists(&mut self, uid: Uid) -> Result<bool, Error> {
        if !self.layout.contains(&uid) {
            return Ok(false);
        }
        if !self.possibly_exists(uid)? {
            return Ok(false);
        }
        Ok(self.find(uid)?.is_some())
    }

    /// Opens a recording session for `uid`. Calling it again for the same uid keeps the
    /// session; a different uid is rejected while a session is open.
    pub fn begin_record(&mut self, uid: Uid) -> Result<(), Error> {
        self.check_uid(&uid)?;

        if let Some(pending) = self.pending {
            if pending.uid == uid {
                return Ok(());
            }
            return Err(Error::RecordingInProgress);
        }

        #[cfg(feature = "defmt")]
        debug!("begin_record: {}", uid);

        self.pending = Some(Pending { uid, length: 0 });
        Ok(())
    }

    /// Appends one action to the open session. If the region can't hold it, even after a
    /// compaction, the session is aborted and the stored macros are left untouched.
    pub fn record_action(&mut self, pressed: bool, row: u8, column: u8) -> Result<(), Error> {
        let Some(pending) = self.pending else {
            return Err(Error::NotRecording);
        };

        let result = self.append_action(pending, Action::new(pressed, row, column));
        match result {
            Ok(()) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.length += 1;
                }
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                warn!("record_action failed, aborting recording of {}", pending.uid);

                self.pending = None;
            }
        }
        result
    }

    fn append_action(&mut self, pending: Pending, action: Action) -> Result<(), Error> {
        if pending.length == u8::MAX {
            return Err(Error::CapacityExceeded);
        }

        // opportunistic compaction on the first action, when less than a quarter of the
        // region is left
        if pending.length == 0
            && self.deleted_slots > 0
            && self.free_slots() * 4 < self.slot_count()
        {
            self.compress()?;
        }
        if !self.has_room(pending.length) && self.deleted_slots > 0 {
            self.compress()?;
        }
        if !self.has_room(pending.length) {
            return Err(Error::CapacityExceeded);
        }

        #[cfg(feature = "defmt")]
        trace!("record_action: {} #{}", action, pending.length);

        let index = self.cursor + 1 + pending.length as usize;
        self.write_slot(index, action.to_slot())
    }

    /// Closes the session and commits it as the macro for `uid`, replacing any previous one.
    /// An empty recording is discarded without touching the image. Returns whether a macro
    /// was stored. A `uid` other than the one being recorded is rejected and the session
    /// stays open.
    pub fn finalize(&mut self, uid: Uid) -> Result<bool, Error> {
        self.check_uid(&uid)?;
        let Some(pending) = self.pending else {
            return Err(Error::NotRecording);
        };
        if pending.uid != uid {
            return Err(Error::RecordingInProgress);
        }
        self.pending = None;

        if pending.length == 0 {
            #[cfg(feature = "defmt")]
            debug!("finalize: empty recording for {} discarded", uid);
            return Ok(false);
        }

        #[cfg(feature = "defmt")]
        debug!("finalize: {} with {} actions", uid, pending.length);

        self.begin_update()?;

        if let Some((index, header)) = self.find(uid)? {
            self.delete_at(index, header)?;
        }

        let header = Header {
            type_: SlotType::Valid,
            length: pending.length,
            uid,
        };
        self.write_slot(self.cursor, header.to_slot()?)?;
        self.cursor += header.span();
        self.write_terminator()?;
        self.set_exists(uid, true)?;

        self.end_update()?;
        Ok(true)
    }

    /// Drops the open session without writing anything. Returns whether one was open.
    pub fn abort_record(&mut self) -> bool {
        #[cfg(feature = "defmt")]
        if let Some(pending) = self.pending {
            debug!("abort_record: {}", pending.uid);
        }

        self.pending.take().is_some()
    }

    /// Loads the actions of the macro stored for `uid`, in recorded order.
    pub fn actions(&mut self, uid: Uid) -> Result<Vec<Action>, Error> {
        if !self.exists_fast(uid)? {
            return Err(Error::NotFound);
        }
        let Some((index, header)) = self.find(uid)? else {
            return Err(Error::NotFound);
        };

        let mut actions = Vec::with_capacity(header.length as usize);
        for i in 0..header.length as usize {
            let raw = self.read_slot(index + 1 + i)?;
            actions.push(Action::from_slot(&raw));
        }
        Ok(actions)
    }

    /// Replays the macro stored for `uid`, handing every action to `exec` in recorded order.
    /// Returns the number of actions replayed.
    pub fn play<F>(&mut self, uid: Uid, mut exec: F) -> Result<usize, Error>
    where
        F: FnMut(Action) -> Result<(), Error>,
    {
        let actions = self.actions(uid)?;
        for action in actions.iter() {
            exec(*action)?;
        }
        Ok(actions.len())
    }

    /// Marks the macro for `uid` as deleted. The space is reclaimed by the next compaction.
    /// Returns whether a macro was deleted.
    pub fn clear(&mut self, uid: Uid) -> Result<bool, Error> {
        if !self.layout.contains(&uid) {
            return Ok(false);
        }
        let Some((index, header)) = self.find(uid)? else {
            return Ok(false);
        };

        #[cfg(feature = "defmt")]
        debug!("clear: {}", uid);

        self.begin_update()?;
        self.delete_at(index, header)?;
        self.end_update()?;
        Ok(true)
    }

    /// Invalidates every macro and the whole existence table in one pass. An open
    /// recording session survives and moves to the start of the region.
    pub fn clear_all(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        debug!("clear_all");

        self.begin_update()?;
        self.erase_table()?;

        let old_cursor = self.cursor;
        self.cursor = 0;
        self.deleted_slots = 0;
        self.carry_pending(old_cursor)?;
        self.write_terminator()?;

        self.end_update()
    }

    /// Shifts every valid macro towards slot 0, overwriting the space of deleted ones while
    /// keeping the relative order. The existence table is untouched since it only tracks
    /// presence, never positions.
    pub fn compress(&mut self) -> Result<(), Error> {
        if self.deleted_slots == 0 {
            return Ok(());
        }

        #[cfg(feature = "defmt")]
        debug!("compress: reclaiming {} slots", self.deleted_slots);

        self.begin_update()?;

        let mut read = 0;
        let mut write = 0;
        while read < self.cursor {
            let header = self.read_header(read)?;
            let span = header.span();
            match header.type_ {
                SlotType::Valid => {
                    if write != read {
                        self.eeprom.copy(
                            self.layout.slot(write),
                            self.layout.slot(read),
                            span * SLOT_SIZE,
                        )?;
                    }
                    write += span;
                }
                SlotType::Deleted => {}
                SlotType::NonExistent => break,
            }
            read += span;
        }

        let old_cursor = self.cursor;
        self.cursor = write;
        self.deleted_slots = 0;
        self.carry_pending(old_cursor)?;
        self.write_terminator()?;

        self.end_update()
    }

    pub fn statistics(&mut self) -> Result<MacroStatistics, Error> {
        let mut stats = MacroStatistics {
            slots: self.slot_count(),
            free_slots: self.free_slots(),
            ..Default::default()
        };

        let mut index = 0;
        while index < self.cursor {
            let header = self.read_header(index)?;
            match header.type_ {
                SlotType::Valid => {
                    stats.valid_macros += 1;
                    stats.used_slots += header.span();
                }
                SlotType::Deleted => {
                    stats.deleted_macros += 1;
                    stats.deleted_slots += header.span();
                }
                SlotType::NonExistent => break,
            }
            index += header.span();
        }
        Ok(stats)
    }

    fn load(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("load");

        let mut meta = [0u8; META_SIZE];
        self.eeprom.read_slice(self.layout.meta(0), &mut meta)?;
        self.marker_index = match Marker::parse(&meta) {
            Marker::Version { index, version } if version == VERSION => index,
            _ => return Err(Error::LayoutMismatch),
        };

        if self.eeprom.read(self.layout.table_rows())? != self.layout.rows
            || self.eeprom.read(self.layout.table_columns())? != self.layout.columns
            || self.eeprom.read(self.layout.macros_length())? != self.layout.slot_count
        {
            return Err(Error::LayoutMismatch);
        }

        let mut index = 0;
        let mut deleted_slots = 0;
        while index < self.slot_count() {
            let header = self.read_header(index)?;
            match header.type_ {
                SlotType::NonExistent => break,
                SlotType::Deleted => deleted_slots += header.span(),
                SlotType::Valid => {}
            }
            index += header.span();
            if index > self.slot_count() {
                return Err(Error::CorruptedData);
            }
        }

        self.cursor = index;
        self.deleted_slots = deleted_slots;
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        debug!("initialize: {} slots", self.layout.slot_count);

        // the inconsistent marker goes first, a torn initialization is retried on next start
        self.marker_index = 0;
        self.eeprom.write(self.layout.meta(0), VERSION_INCONSISTENT)?;
        for index in 1..META_SIZE as u8 {
            self.eeprom.write(self.layout.meta(index), ERASED)?;
        }

        self.eeprom.write(self.layout.table_rows(), self.layout.rows)?;
        self.eeprom.write(self.layout.table_columns(), self.layout.columns)?;
        self.erase_table()?;
        self.eeprom.write(self.layout.macros_length(), self.layout.slot_count)?;

        self.cursor = 0;
        self.deleted_slots = 0;
        self.pending = None;
        self.write_terminator()?;

        self.end_update()
    }

    /// Overwrites the current version byte with the inconsistent marker.
    fn begin_update(&mut self) -> Result<(), Error> {
        self.eeprom.write(self.layout.meta(self.marker_index), VERSION_INCONSISTENT)
    }

    /// Moves the version to the next meta byte, then erases the old one. Rotating spreads
    /// the wear of every update over all meta bytes.
    fn end_update(&mut self) -> Result<(), Error> {
        let next = (self.marker_index + 1) % META_SIZE as u8;
        self.eeprom.write(self.layout.meta(next), VERSION)?;
        self.eeprom.write(self.layout.meta(self.marker_index), ERASED)?;
        self.marker_index = next;
        Ok(())
    }

    fn find(&mut self, uid: Uid) -> Result<Option<(usize, Header)>, Error> {
        let mut index = 0;
        while index < self.cursor {
            let header = self.read_header(index)?;
            match header.type_ {
                SlotType::Valid if header.uid == uid => return Ok(Some((index, header))),
                SlotType::NonExistent => break,
                _ => {}
            }
            index += header.span();
        }
        Ok(None)
    }

    fn delete_at(&mut self, index: usize, header: Header) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("delete_at: slot {} ({} actions)", index, header.length);

        self.eeprom.write(self.layout.slot(index), SlotType::Deleted as u8)?;
        self.deleted_slots += header.span();
        self.set_exists(header.uid, false)
    }

    /// Moves the actions of an open session from behind `old_cursor` to behind the current
    /// cursor. The cursor only ever moves towards slot 0 here, so an ascending copy is safe.
    fn carry_pending(&mut self, old_cursor: usize) -> Result<(), Error> {
        let Some(pending) = self.pending else {
            return Ok(());
        };
        if pending.length == 0 || old_cursor == self.cursor {
            return Ok(());
        }
        self.eeprom.copy(
            self.layout.slot(self.cursor + 1),
            self.layout.slot(old_cursor + 1),
            pending.length as usize * SLOT_SIZE,
        )
    }

    fn write_terminator(&mut self) -> Result<(), Error> {
        if self.cursor < self.slot_count() {
            self.eeprom.write(self.layout.slot(self.cursor), ERASED)?;
        }
        Ok(())
    }

    fn erase_table(&mut self) -> Result<(), Error> {
        let start = self.layout.table_data();
        for address in start..start + self.layout.table_len() as u32 {
            self.eeprom.write(address, ERASED)?;
        }
        Ok(())
    }

    /// A clear bit in the existence table means the macro exists. Layers above
    /// [`MAX_TABLE_LAYER`] have no bit and always need a scan.
    fn possibly_exists(&mut self, uid: Uid) -> Result<bool, Error> {
        if uid.layer > MAX_TABLE_LAYER {
            return Ok(true);
        }
        let cell = self.eeprom.read(self.layout.cell(uid.row, uid.column))?;
        Ok(cell & (1 << uid.layer) == 0)
    }

    fn exists_fast(&mut self, uid: Uid) -> Result<bool, Error> {
        Ok(self.layout.contains(&uid) && self.possibly_exists(uid)?)
    }

    fn set_exists(&mut self, uid: Uid, exists: bool) -> Result<(), Error> {
        if uid.layer > MAX_TABLE_LAYER {
            return Ok(());
        }
        let address = self.layout.cell(uid.row, uid.column);
        let cell = self.eeprom.read(address)?;
        let cell = if exists {
            cell & !(1 << uid.layer)
        } else {
            cell | (1 << uid.layer)
        };
        self.eeprom.write(address, cell)
    }

    fn check_uid(&self, uid: &Uid) -> Result<(), Error> {
        uid.pack()?;
        if !self.layout.contains(uid) {
            return Err(Error::InvalidUid);
        }
        Ok(())
    }

    fn free_slots(&self) -> usize {
        self.slot_count() - self.cursor
    }

    /// Room for the reserved header, `length` recorded actions and one more.
    fn has_room(&self, length: u8) -> bool {
        self.cursor + 1 + length as usize + 1 <= self.slot_count()
    }

    fn read_slot(&mut self, index: usize) -> Result<[u8; SLOT_SIZE], Error> {
        let mut raw = [0u8; SLOT_SIZE];
        self.eeprom.read_slice(self.layout.slot(index), &mut raw)?;
        Ok(raw)
    }

    fn read_header(&mut self, index: usize) -> Result<Header, Error> {
        let raw = self.read_slot(index)?;
        Header::from_slot(&raw)
    }

    fn write_slot(&mut self, index: usize, raw: [u8; SLOT_SIZE]) -> Result<(), Error> {
        self.eeprom.write_slice(self.layout.slot(index), &raw)
    }
}
