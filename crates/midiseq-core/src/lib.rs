//! Sequencer core: format parsing, row building, tempo timeline, loop
//! handling and playback for the MIDI family of game-music formats.
//!
//! Supported containers: Standard MIDI (and RIFF RMI), GMF, CMF, IMF,
//! RSXX, plus DMX MUS and AIL XMIDI through `midiseq-convert`.
//!
//! Feature gates: `mus` (DMX MUS), `xmi` (AIL XMIDI, multi-song).

pub mod error;
pub use error::{Error, Result};

pub mod bytes;
pub mod event;
pub mod format;
pub mod fraction;
pub mod loop_state;
pub mod parser;
pub mod position;
pub mod timeline;
pub mod track;

mod config;
mod interface;
mod playback;
mod sequencer;
mod shared;
mod song;

pub use config::SequencerConfig;
pub use event::{EventKind, MetaKind, MidiEvent};
pub use format::{detect_imf, detect_rsxx, sniff, CmfInstrument, Container, FileFormat};
pub use fraction::Fraction;
pub use interface::{MidiRtInterface, NullInterface};
pub use playback::ANTI_FREEZE_LIMIT;
pub use sequencer::{Sequencer, SequencerBuilder};
pub use shared::SharedSequencer;
pub use timeline::Marker;
