//! Error types for midiseq-core.

use thiserror::Error;

/// Error type for loading and controlling a sequence.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected end of file at {context}")]
    UnexpectedEof { context: &'static str },

    #[error("Invalid format, {expected} signature is not found in {format} data")]
    InvalidSignature {
        format: &'static str,
        expected: &'static str,
    },

    #[error("Invalid time division: {0} ticks per quarter note")]
    InvalidDivision(u64),

    #[error("Empty track data")]
    EmptyTrackData,

    #[error("MIDI data parsing error has occurred!\n{details}")]
    TrackData { details: String },

    #[error("Unknown or unsupported file format")]
    UnknownFormat,

    #[cfg(any(feature = "mus", feature = "xmi"))]
    #[error("Conversion failed: {0}")]
    Conversion(#[from] midiseq_convert::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Song {index} is out of range ({count} songs)")]
    SongIndex { index: usize, count: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
