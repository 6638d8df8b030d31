//! GMF: a single headerless SMF track behind a seven-byte preamble.

use super::{half_second_quarter, FileFormat, Source, HEADER_SIZE};
use crate::error::{Error, Result};

const GMF_DIVISION: u64 = 192;
const GMF_TRACK_OFFSET: usize = 7;

/// GMF tracks lack an end-of-track meta; one is appended.
const END_TAG: [u8; 4] = [0xFF, 0x2F, 0x00, 0x00];

pub(crate) fn parse_gmf(data: &[u8]) -> Result<Source> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof { context: "header" });
    }
    if !data.starts_with(b"GMF\x01") {
        return Err(Error::InvalidSignature {
            format: "GMF",
            expected: "GMF\\x1",
        });
    }
    let mut track = data[GMF_TRACK_OFFSET..].to_vec();
    track.extend_from_slice(&END_TAG);
    Ok(Source::tracks(
        FileFormat::Midi,
        GMF_DIVISION,
        half_second_quarter(GMF_DIVISION),
        vec![track],
    ))
}
