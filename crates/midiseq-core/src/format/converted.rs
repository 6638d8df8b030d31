//! Formats that play through a converted Standard MIDI File.

use tracing::debug;

#[cfg(feature = "mus")]
use super::smf;
use super::Source;
#[cfg(feature = "mus")]
use super::FileFormat;
use crate::error::Result;

/// DMX MUS. Plays and reports as plain MIDI.
#[cfg(feature = "mus")]
pub(crate) fn parse_mus(data: &[u8]) -> Result<Source> {
    let smf = midiseq_convert::mus_to_midi(data)?;
    debug!(len = smf.len(), "Converted MUS");
    smf::parse_smf(&smf, FileFormat::Midi)
}

/// AIL XMIDI. Every song is converted up front so the song can be switched
/// later without the original data.
#[cfg(feature = "xmi")]
pub(crate) fn parse_xmi(data: &[u8], song_number: usize) -> Result<Source> {
    let songs = midiseq_convert::xmi_to_midi(data)?;
    let index = song_number.min(songs.len().saturating_sub(1));
    debug!(songs = songs.len(), index, "Converted XMI");
    super::load_song(songs, index)
}
