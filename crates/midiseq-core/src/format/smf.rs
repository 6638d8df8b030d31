//! Standard MIDI File and its RIFF `RMID` wrapper.

use tracing::{debug, trace};

use super::{check_division, half_second_quarter, FileFormat, Source, HEADER_SIZE};
use crate::bytes::{read_be, ByteCursor};
use crate::error::{Error, Result};

/// Offset of the embedded `MThd` chunk inside an RMI file.
const RMI_SMF_OFFSET: usize = 20;

pub(crate) fn parse_smf(data: &[u8], format: FileFormat) -> Result<Source> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof { context: "header" });
    }
    if !data.starts_with(b"MThd\0\0\0\x06") {
        return Err(Error::InvalidSignature {
            format: "SMF",
            expected: "MThd",
        });
    }

    let mut smf_format = read_be(&data[8..10]) as u16;
    if smf_format > 2 {
        smf_format = 1;
    }
    let track_count = read_be(&data[10..12]) as usize;
    let division = check_division(read_be(&data[12..14]))?;

    debug!(smf_format, track_count, division, "Parsing SMF");

    let mut cursor = ByteCursor::new(&data[HEADER_SIZE..]);
    let mut tracks = Vec::with_capacity(track_count);
    while tracks.len() < track_count {
        let header = cursor.read_slice(8).ok_or(Error::InvalidSignature {
            format: "SMF",
            expected: "MTrk",
        })?;
        let length = read_be(&header[4..8]);
        let body = cursor
            .read_slice_u64(length)
            .ok_or(Error::UnexpectedEof {
                context: "track data",
            })?;
        if &header[..4] != b"MTrk" {
            trace!(
                chunk = %String::from_utf8_lossy(&header[..4]),
                length,
                "Skipping unknown chunk"
            );
            continue;
        }
        tracks.push(body.to_vec());
    }

    if tracks.iter().all(|t| t.is_empty()) {
        return Err(Error::EmptyTrackData);
    }

    let mut source = Source::tracks(format, division, half_second_quarter(division), tracks);
    source.smf_format = smf_format;
    Ok(source)
}

pub(crate) fn parse_rmi(data: &[u8]) -> Result<Source> {
    if !data.starts_with(b"RIFF") {
        return Err(Error::InvalidSignature {
            format: "RMI",
            expected: "RIFF",
        });
    }
    let inner = data
        .get(RMI_SMF_OFFSET..)
        .ok_or(Error::UnexpectedEof { context: "header" })?;
    parse_smf(inner, FileFormat::Midi)
}
