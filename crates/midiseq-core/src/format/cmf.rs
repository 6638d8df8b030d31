//! Creative Music File (`CTMF`).
//!
//! Layout used here (all little endian):
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | `CTMF` |
//! | 6 | 2 | instrument block offset |
//! | 8 | 2 | music block offset |
//! | 12 | 2 | ticks per quarter note |
//! | 14 | 6 | title/author/remarks offsets |
//! | 20 | 16 | channel-in-use table |
//! | 36 | 2 | instrument count |
//!
//! The music block runs to the end of the file.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_division, one_second_quarter, FileFormat, Source, HEADER_SIZE};
use crate::bytes::read_le;
use crate::error::{Error, Result};

const INSTRUMENT_SIZE: usize = 16;
const TEXT_OFFSETS: usize = HEADER_SIZE + 6;
const INSTRUMENT_COUNT_OFFSET: usize = TEXT_OFFSETS + 16;

/// One raw 16-byte SBI-style instrument record from a CMF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmfInstrument {
    pub data: [u8; INSTRUMENT_SIZE],
}

pub(crate) fn parse_cmf(data: &[u8]) -> Result<Source> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof { context: "header" });
    }
    if !data.starts_with(b"CTMF") {
        return Err(Error::InvalidSignature {
            format: "CMF",
            expected: "CTMF",
        });
    }

    let ins_start = read_le(&data[6..8]) as usize;
    let mus_start = read_le(&data[8..10]) as usize;
    let ticks = read_le(&data[12..14]);

    if data.len() < TEXT_OFFSETS {
        return Err(Error::UnexpectedEof {
            context: "CTMF header",
        });
    }
    let count_bytes = data
        .get(INSTRUMENT_COUNT_OFFSET..INSTRUMENT_COUNT_OFFSET + 4)
        .ok_or(Error::UnexpectedEof {
            context: "CMF instruments block header",
        })?;
    let ins_count = read_le(&count_bytes[..2]) as usize;

    let instruments = (0..ins_count)
        .map(|i| {
            let at = ins_start + i * INSTRUMENT_SIZE;
            data.get(at..at + INSTRUMENT_SIZE)
                .and_then(|raw| raw.try_into().ok())
                .map(|data| CmfInstrument { data })
                .ok_or(Error::UnexpectedEof {
                    context: "CMF instruments raw data",
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let division = check_division(ticks)?;
    let track = data.get(mus_start..).unwrap_or_default().to_vec();
    if track.is_empty() {
        return Err(Error::EmptyTrackData);
    }

    debug!(
        instruments = instruments.len(),
        division, mus_start, "Parsing CMF"
    );

    let mut source = Source::tracks(
        FileFormat::Cmf,
        division,
        one_second_quarter(division),
        vec![track],
    );
    source.cmf_instruments = instruments;
    Ok(source)
}
