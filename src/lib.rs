//! # midiseq - MIDI-family sequencer
//!
//! Plays Standard MIDI Files and the game-music formats built around them
//! through a callback interface to any synthesizer backend.
//!
//! ## Architecture
//!
//! midiseq is an umbrella crate over:
//! - **midiseq-core** - Format parsing, row building, tempo timeline, loops, playback
//! - **midiseq-convert** - DMX MUS and AIL XMIDI to SMF converters
//!
//! ## Quick Start
//!
//! ```ignore
//! use midiseq::prelude::*;
//!
//! let mut seq = Sequencer::builder(my_synth)
//!     .loop_enabled(true)
//!     .build()?;
//! seq.load_file("e1m1.mus")?;
//!
//! // Drive from the audio thread
//! let next = seq.tick(elapsed_seconds, 0.0001);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Every format
//! - `mus` - DMX MUS
//! - `xmi` - AIL XMIDI, multi-song

/// Re-export of midiseq-core for direct access
pub use midiseq_core as core;

/// Re-export of midiseq-convert for direct access
pub use midiseq_convert as convert;

pub use midiseq_core::{
    detect_imf,
    detect_rsxx,
    sniff,
    CmfInstrument,
    Container,
    // Error
    Error,
    // Events
    EventKind,
    FileFormat,
    Fraction,
    Marker,
    MetaKind,
    MidiEvent,
    // Interface
    MidiRtInterface,
    NullInterface,
    Result,
    // Sequencer
    Sequencer,
    SequencerBuilder,
    SequencerConfig,
    SharedSequencer,
    ANTI_FREEZE_LIMIT,
};

/// Convenient imports for typical usage.
pub mod prelude {
    pub use crate::{
        Error, EventKind, FileFormat, Marker, MetaKind, MidiRtInterface, Result, Sequencer,
        SequencerBuilder, SequencerConfig, SharedSequencer,
    };
}
