//! # midiseq-convert
//!
//! Byte-to-byte converters that turn legacy game-music containers into
//! Standard MIDI Files the sequencer core can parse:
//!
//! - [`mus_to_midi`]: DMX MUS (Doom engine) to one format-0 SMF
//! - [`xmi_to_midi`]: AIL XMIDI to one format-0 SMF per embedded song
//!
//! ```ignore
//! let songs = midiseq_convert::xmi_to_midi(&bytes)?;
//! println!("{} songs", songs.len());
//! ```

pub mod error;
pub mod mus;
pub mod xmi;

mod smf;

pub use error::{Error, Result};
pub use mus::{mus_to_midi, MUS_TEMPO_US, MUS_TICKS_PER_QUARTER};
pub use xmi::{xmi_to_midi, XMI_TEMPO_US, XMI_TICKS_PER_QUARTER};
