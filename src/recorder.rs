//! Recording and playback of macros on top of the [`MacroStore`](crate::macros::MacroStore).
//!
//! ```text
//! Idle --begin_record--> Recording --record_action--> Recording --finalize--> Idle
//! Idle --play--> Playing --(all actions replayed)--> Idle
//! ```
//!
//! Playback hands every action to a [`KeyDispatch`] together with the keyboard itself, so a
//! replayed key may in turn play another macro. Nesting is bounded by [`MAX_PLAYBACK_DEPTH`].

use crate::error::Error;
use crate::platform::Platform;
use crate::{Action, Keyboard, Uid};
#[cfg(feature = "defmt")]
use defmt::{debug, warn};

/// Maximum number of macros playing at the same time, the outermost one included.
pub const MAX_PLAYBACK_DEPTH: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecorderState {
    Idle,
    Recording(Uid),
    Playing { uid: Uid, depth: u8 },
}

/// The key dispatch collaborator: resolves a key transition against the current layer and
/// executes whatever is bound to it.
pub trait KeyDispatch<T: Platform> {
    fn exec_key(&mut self, keyboard: &mut Keyboard<T>, action: Action) -> Result<(), Error>;
}

impl<T: Platform, D: KeyDispatch<T>> KeyDispatch<T> for &mut D {
    fn exec_key(&mut self, keyboard: &mut Keyboard<T>, action: Action) -> Result<(), Error> {
        (*self).exec_key(keyboard, action)
    }
}

impl<T: Platform> Keyboard<T> {
    pub fn recorder_state(&self) -> RecorderState {
        self.recorder
    }

    /// Start recording a macro for `uid`. Only one session can be open at a time; asking
    /// again for the uid being recorded keeps the session.
    pub fn begin_record(&mut self, uid: Uid) -> Result<(), Error> {
        match self.recorder {
            RecorderState::Idle => {}
            RecorderState::Recording(current) if current == uid => return Ok(()),
            RecorderState::Recording(_) => return Err(Error::RecordingInProgress),
            RecorderState::Playing { .. } => return Err(Error::PlaybackInProgress),
        }

        self.macros.begin_record(uid)?;

        #[cfg(feature = "defmt")]
        debug!("recorder: Idle -> Recording({})", uid);

        self.recorder = RecorderState::Recording(uid);
        Ok(())
    }

    /// Append one key transition to the open session. Any failure, running out of space in
    /// particular, ends the session without touching the stored macros.
    pub fn record_action(&mut self, pressed: bool, row: u8, column: u8) -> Result<(), Error> {
        let RecorderState::Recording(_) = self.recorder else {
            return Err(Error::NotRecording);
        };

        self.macros
            .record_action(pressed, row, column)
            .inspect_err(|_| self.recorder = RecorderState::Idle)
    }

    /// Commit the open session. Returns whether a macro was stored, an empty session is
    /// dropped.
    pub fn finalize_record(&mut self) -> Result<bool, Error> {
        let RecorderState::Recording(uid) = self.recorder else {
            return Err(Error::NotRecording);
        };

        #[cfg(feature = "defmt")]
        debug!("recorder: Recording({}) -> Idle", uid);

        self.recorder = RecorderState::Idle;
        self.macros.finalize(uid)
    }

    /// Drop the open session without writing anything.
    pub fn abort_record(&mut self) -> bool {
        if let RecorderState::Recording(_) = self.recorder {
            self.recorder = RecorderState::Idle;
        }
        self.macros.abort_record()
    }

    /// Entry point for live key transitions: records the transition if a session is open,
    /// then hands it to the dispatch. A failed recording stays silent.
    pub fn exec_key<D: KeyDispatch<T>>(
        &mut self,
        action: Action,
        mut dispatch: D,
    ) -> Result<(), Error> {
        if let RecorderState::Recording(_) = self.recorder {
            if let Err(_e) = self.record_action(action.pressed, action.row, action.column) {
                #[cfg(feature = "defmt")]
                warn!("recording dropped: {}", _e);
            }
        }
        dispatch.exec_key(self, action)
    }

    /// Replay the macro stored for `uid` through `dispatch`, in recorded order and without
    /// any delay between actions. Returns the number of actions replayed.
    pub fn play<D: KeyDispatch<T>>(&mut self, uid: Uid, mut dispatch: D) -> Result<usize, Error> {
        let depth = match self.recorder {
            RecorderState::Idle => 1,
            RecorderState::Playing { depth, .. } if depth < MAX_PLAYBACK_DEPTH => depth + 1,
            RecorderState::Playing { .. } => return Err(Error::RecursionLimit),
            RecorderState::Recording(_) => return Err(Error::RecordingInProgress),
        };

        let actions = self.macros.actions(uid)?;

        #[cfg(feature = "defmt")]
        debug!("recorder: play {} ({} actions, depth {})", uid, actions.len(), depth);

        let previous = self.recorder;
        self.recorder = RecorderState::Playing { uid, depth };
        let result = actions
            .iter()
            .try_for_each(|action| dispatch.exec_key(self, *action));
        self.recorder = previous;

        result.map(|()| actions.len())
    }
}
