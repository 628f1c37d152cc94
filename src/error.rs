use thiserror::Error;

/// Errors that can occur while driving the layer stack or the macro store. Marked as
/// non-exhaustive to allow for future additions without breaking the API. From the end
/// user's point of view every one of them is inert: the worst case is a lost macro.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The geometry does not fit the device, or the board matrix can't be encoded in a slot.
    #[error("invalid geometry")]
    InvalidGeometry,

    /// An address outside of the byte store was requested.
    #[error("invalid address")]
    InvalidAddress,

    /// Row, column or layer of a macro uid can't be represented in the persisted layout.
    #[error("invalid macro uid")]
    InvalidUid,

    /// The internal error value is returned from the provided platform.
    #[error("internal eeprom error")]
    EepromError,

    /// The macro data region can't hold another action plus a header, even after compaction.
    #[error("macro capacity exceeded")]
    CapacityExceeded,

    /// No valid macro is stored for the requested uid.
    #[error("macro not found")]
    NotFound,

    /// The persisted fingerprint (version, rows, columns, slot count) differs from the
    /// compiled in geometry. Handled by re-initialising the store.
    #[error("persisted layout mismatch")]
    LayoutMismatch,

    /// The macro data region could not be walked, e.g. a header points past the end.
    #[error("corrupted macro data")]
    CorruptedData,

    /// Another recording session is active.
    #[error("recording in progress")]
    RecordingInProgress,

    /// A macro is being played back.
    #[error("playback in progress")]
    PlaybackInProgress,

    /// An action was recorded or finalized without an active recording session.
    #[error("not recording")]
    NotRecording,

    /// Macro playback nested deeper than `MAX_PLAYBACK_DEPTH`.
    #[error("playback recursion limit reached")]
    RecursionLimit,

    /// The layer stack already holds `MAX_LAYER_STACK_DEPTH` elements.
    #[error("layer stack full")]
    LayerStackFull,
}
