//! Container formats.
//!
//! [`sniff`] identifies a buffer by its magic bytes (falling back to the
//! IMF and RSXX heuristics) and [`load_source`] runs the matching parser.
//! Parsers only validate headers and slice out raw track bytes; event
//! decoding happens later in the row builder.

mod cmf;
#[cfg(any(feature = "mus", feature = "xmi"))]
mod converted;
mod gmf;
mod imf;
mod rsxx;
mod smf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fraction::Fraction;
use crate::track::TrackData;

pub use cmf::CmfInstrument;
pub use imf::detect_imf;
pub use rsxx::detect_rsxx;

/// Bytes every container needs before it can be identified.
pub const HEADER_SIZE: usize = 14;

/// Format family of the loaded song, as reported by `Sequencer::format`.
///
/// MUS and RMI files play as plain MIDI and report [`FileFormat::Midi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileFormat {
    #[default]
    Midi,
    /// Creative Music File.
    Cmf,
    /// id Software Music File (raw OPL register stream).
    Imf,
    /// Rise of the Triad RSXX.
    Rsxx,
    /// AIL Extended MIDI.
    Xmidi,
}

/// Container detected from a file's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Smf,
    Rmi,
    Gmf,
    Mus,
    Xmi,
    Cmf,
    Imf,
    Rsxx,
}

/// Identifies the container in `data`.
///
/// Magic signatures are checked first, then the IMF and RSXX heuristics.
pub fn sniff(data: &[u8]) -> Result<Container> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof { context: "header" });
    }
    let container = if data.starts_with(b"MThd\0\0\0\x06") {
        Container::Smf
    } else if data.starts_with(b"RIFF") {
        Container::Rmi
    } else if data.starts_with(b"GMF\x01") {
        Container::Gmf
    } else if data.starts_with(b"MUS\x1A") {
        Container::Mus
    } else if data.starts_with(b"FORM") && &data[8..12] == b"XDIR" {
        Container::Xmi
    } else if data.starts_with(b"CTMF") {
        Container::Cmf
    } else if detect_imf(data) {
        Container::Imf
    } else if detect_rsxx(data) {
        Container::Rsxx
    } else {
        return Err(Error::UnknownFormat);
    };
    Ok(container)
}

/// Output of a container parser.
#[derive(Debug)]
pub(crate) struct Source {
    pub format: FileFormat,
    pub smf_format: u16,
    /// Ticks per quarter note.
    pub division: u64,
    /// Seconds per tick before the first tempo event.
    pub initial_tempo: Fraction,
    pub body: SourceBody,
    pub cmf_instruments: Vec<CmfInstrument>,
    /// Converted SMF buffers of a multi-song container, kept for song switching.
    pub songs: Vec<Vec<u8>>,
    pub song_index: usize,
}

#[derive(Debug)]
pub(crate) enum SourceBody {
    /// Raw track bytes for the row builder.
    Tracks {
        tracks: Vec<Vec<u8>>,
        /// False when the first event carries no delta-time prefix.
        leading_delta: bool,
    },
    /// Rows produced directly by the container parser.
    Rows(TrackData),
}

impl Source {
    pub(crate) fn tracks(
        format: FileFormat,
        division: u64,
        initial_tempo: Fraction,
        tracks: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            format,
            smf_format: 0,
            division,
            initial_tempo,
            body: SourceBody::Tracks {
                tracks,
                leading_delta: true,
            },
            cmf_instruments: Vec::new(),
            songs: Vec::new(),
            song_index: 0,
        }
    }

    /// Scale from a tempo payload (microseconds per quarter) to seconds per
    /// tick.
    pub(crate) fn inv_division(&self) -> Fraction {
        inv_division(self.division)
    }
}

/// One microsecond expressed in ticks: `1 / (1_000_000 * division)`.
pub(crate) fn inv_division(division: u64) -> Fraction {
    Fraction::new(1, 1_000_000 * u128::from(division))
}

pub(crate) fn check_division(division: u64) -> Result<u64> {
    if division == 0 {
        return Err(Error::InvalidDivision(division));
    }
    Ok(division)
}

/// Default tempo of 120 BPM at `division` ticks per quarter.
pub(crate) fn half_second_quarter(division: u64) -> Fraction {
    Fraction::new(1, 2 * u128::from(division))
}

/// One quarter note per second at `division` ticks per quarter.
pub(crate) fn one_second_quarter(division: u64) -> Fraction {
    Fraction::new(1, u128::from(division))
}

/// Parses `data` into raw tracks. `song_number` picks the song of
/// multi-song containers and is clamped to the last one.
#[cfg_attr(not(feature = "xmi"), allow(unused_variables))]
pub(crate) fn load_source(data: &[u8], song_number: usize) -> Result<Source> {
    let container = sniff(data)?;
    debug!(?container, len = data.len(), "Detected container");
    match container {
        Container::Smf => smf::parse_smf(data, FileFormat::Midi),
        Container::Rmi => smf::parse_rmi(data),
        Container::Gmf => gmf::parse_gmf(data),
        Container::Cmf => cmf::parse_cmf(data),
        Container::Imf => imf::parse_imf(data),
        Container::Rsxx => rsxx::parse_rsxx(data),
        #[cfg(feature = "mus")]
        Container::Mus => converted::parse_mus(data),
        #[cfg(feature = "xmi")]
        Container::Xmi => converted::parse_xmi(data, song_number),
        #[allow(unreachable_patterns)]
        _ => Err(Error::UnknownFormat),
    }
}

/// Parses one converted SMF buffer as song `index` of a multi-song set.
pub(crate) fn load_song(songs: Vec<Vec<u8>>, index: usize) -> Result<Source> {
    let count = songs.len();
    let data = songs.get(index).ok_or(Error::SongIndex { index, count })?;
    let mut source = smf::parse_smf(data, FileFormat::Xmidi)?;
    source.songs = songs;
    source.song_index = index;
    Ok(source)
}
