//! Rise of the Triad RSXX music.
//!
//! The first byte is the offset of the event stream; a `rsxx}u` tag sits
//! sixteen bytes before it. Events carry no leading delta and the stream
//! runs to the end of the file.

use tracing::debug;

use super::{one_second_quarter, FileFormat, Source, SourceBody, HEADER_SIZE};
use crate::error::{Error, Result};

const RSXX_TAG: &[u8] = b"rsxx}u";
const TAG_DISTANCE: usize = 0x10;
const MIN_DATA_OFFSET: u8 = 0x5D;
const RSXX_DIVISION: u64 = 60;

fn tag_matches(data: &[u8]) -> bool {
    let Some(&start) = data.first() else {
        return false;
    };
    if start < MIN_DATA_OFFSET || data.len() <= usize::from(start) {
        return false;
    }
    let tag_at = usize::from(start) - TAG_DISTANCE;
    data.get(tag_at..tag_at + RSXX_TAG.len()) == Some(RSXX_TAG)
}

/// Checks the data offset and the `rsxx}u` tag.
pub fn detect_rsxx(data: &[u8]) -> bool {
    tag_matches(data)
}

pub(crate) fn parse_rsxx(data: &[u8]) -> Result<Source> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof { context: "header" });
    }
    let start = usize::from(data[0]);
    if data[0] < MIN_DATA_OFFSET || data.len() <= start {
        return Err(Error::UnexpectedEof {
            context: "RSXX song",
        });
    }
    if !tag_matches(data) {
        return Err(Error::InvalidSignature {
            format: "RSXX",
            expected: "rsxx}u",
        });
    }

    let mut track = data[start..].to_vec();
    // A trailing zero closes a final delta left open by the stream.
    track.push(0);

    debug!(start, len = track.len(), "Parsing RSXX");

    let mut source = Source::tracks(
        FileFormat::Rsxx,
        RSXX_DIVISION,
        one_second_quarter(RSXX_DIVISION),
        vec![track],
    );
    if let SourceBody::Tracks { leading_delta, .. } = &mut source.body {
        *leading_delta = false;
    }
    Ok(source)
}
