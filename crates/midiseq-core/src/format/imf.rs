//! id Software Music File: a bare stream of OPL register writes.
//!
//! Each record is `[register, value, delay_lo, delay_hi]`, the delay in
//! ticks of a fixed 700 Hz clock. Type-1 files start with a 16-bit length
//! word; type-0 files run to the end of the data.

use std::mem;

use tracing::debug;

use super::{half_second_quarter, inv_division, FileFormat, Source, SourceBody};
use crate::bytes::read_le;
use crate::error::{Error, Result};
use crate::event::{MetaKind, MidiEvent};
use crate::fraction::Fraction;
use crate::track::{Row, TempoChange, TrackData};

/// Microseconds per tick of the IMF clock (about 700 Hz).
pub const IMF_TEMPO_US: u32 = 1428;
const IMF_DIVISION: u64 = 1;
const RECORD_SIZE: usize = 4;
/// Records sampled by [`detect_imf`].
const DETECT_RECORDS: usize = 16383;

/// Heuristic IMF detector.
///
/// IMF data is mostly small register/value pairs followed by mostly zero
/// delays, so over the sampled records the sum of the first 16-bit words
/// exceeds the sum of the second ones. The length word of a type-1 file
/// must be a multiple of four.
pub fn detect_imf(data: &[u8]) -> bool {
    let Some(head) = data.get(..2) else {
        return false;
    };
    let end = read_le(head) as usize;
    if end & 3 != 0 {
        return false;
    }
    let start = if end > 0 { 2 } else { 0 };
    let (sum1, sum2) = data[start..]
        .chunks_exact(RECORD_SIZE)
        .take(DETECT_RECORDS)
        .fold((0u64, 0u64), |(a, b), rec| {
            (a + read_le(&rec[..2]), b + read_le(&rec[2..]))
        });
    sum1 > sum2
}

pub(crate) fn parse_imf(data: &[u8]) -> Result<Source> {
    let head = data
        .get(..2)
        .ok_or(Error::UnexpectedEof { context: "header" })?;
    let mut imf_end = read_le(head) as usize;
    let mut pos = if imf_end > 0 { 2 } else { 0 };
    if imf_end == 0 {
        imf_end = data.len();
    }

    let tempo = inv_division(IMF_DIVISION) * Fraction::from_int(u64::from(IMF_TEMPO_US));
    let mut rows = Vec::new();
    let mut row = Row::new(0);
    row.events
        .push(MidiEvent::meta(MetaKind::TempoChange, &IMF_TEMPO_US.to_be_bytes()));

    let mut abs = 0u64;
    while pos < imf_end {
        let Some(record) = data.get(pos..pos + RECORD_SIZE) else {
            break;
        };
        pos += RECORD_SIZE;
        row.events.push(MidiEvent::meta(MetaKind::RawOpl, &record[..2]));
        row.delay = read_le(&record[2..]);
        if row.delay > 0 {
            row.abs_tick = abs;
            abs += row.delay;
            rows.push(mem::replace(&mut row, Row::new(abs)));
        }
    }
    row.abs_tick = abs;
    row.delay = 0;
    row.events.push(MidiEvent::end_of_track());
    rows.push(row);

    debug!(rows = rows.len(), ticks = abs, "Parsed IMF");

    let track_data = TrackData {
        tracks: vec![rows],
        tempos: vec![TempoChange { tick: 0, tempo }],
        invalid_loop: true,
        ..Default::default()
    };
    Ok(Source {
        format: FileFormat::Imf,
        smf_format: 0,
        division: IMF_DIVISION,
        initial_tempo: half_second_quarter(IMF_DIVISION),
        body: SourceBody::Rows(track_data),
        cmf_instruments: Vec::new(),
        songs: Vec::new(),
        song_index: 0,
    })
}
