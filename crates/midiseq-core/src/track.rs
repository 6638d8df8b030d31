//! Row builder.
//!
//! Turns raw track bytes into rows of simultaneous events, collects tempo
//! changes and validates loop markers. Each row is sorted once when it
//! closes so that note-offs, loop markers and controllers are dispatched
//! before the notes that follow them.

use std::mem;

use tracing::{debug, warn};

use crate::bytes::{read_be, ByteCursor};
use crate::error::{Error, Result};
use crate::event::{EventKind, MetaKind, MidiEvent};
use crate::fraction::Fraction;
use crate::loop_state::LoopStackEntry;
use crate::parser::ParserContext;

/// All events of one track at one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub events: Vec<MidiEvent>,
    /// Ticks until the next row of the same track.
    pub delay: u64,
    pub abs_tick: u64,
    /// Seconds from song begin, exact.
    pub time: Fraction,
    /// Seconds until the next row, exact.
    pub time_delta: Fraction,
}

impl Row {
    pub fn new(abs_tick: u64) -> Self {
        Self {
            abs_tick,
            ..Default::default()
        }
    }

    /// Row time in seconds.
    #[inline]
    pub fn seconds(&self) -> f64 {
        self.time.to_f64()
    }
}

/// A tempo change at an absolute tick, as seconds per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub tempo: Fraction,
}

/// Everything the row builder produces for one song.
#[derive(Debug, Clone, Default)]
pub struct TrackData {
    pub tracks: Vec<Vec<Row>>,
    /// Tempo changes of all tracks, in collection order.
    pub tempos: Vec<TempoChange>,
    pub loop_start_tick: u64,
    pub loop_end_tick: u64,
    pub invalid_loop: bool,
    /// Nested loop levels in order of first appearance.
    pub loop_stack: Vec<LoopStackEntry>,
}

impl TrackData {
    /// Length of the longest track in ticks.
    pub fn length_ticks(&self) -> u64 {
        self.tracks
            .iter()
            .filter_map(|rows| rows.last())
            .map(|row| row.abs_tick.saturating_add(row.delay))
            .max()
            .unwrap_or(0)
    }
}

/// Note-on state per channel and key, indexed `channel * 255 + key`.
pub(crate) struct NoteStates(Vec<bool>);

impl NoteStates {
    pub(crate) fn new() -> Self {
        Self(vec![false; 16 * 255])
    }

    #[inline]
    fn index(event: &MidiEvent) -> usize {
        usize::from(event.channel & 0x0F) * 255 + usize::from(event.byte(0) & 0x7F)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    SysEx,
    NoteOff,
    Marker,
    Controller,
    Other,
}

fn bucket(event: &MidiEvent) -> Bucket {
    match event.kind {
        EventKind::NoteOff => Bucket::NoteOff,
        EventKind::SysEx => Bucket::SysEx,
        EventKind::ControlChange
        | EventKind::PatchChange
        | EventKind::PitchBend
        | EventKind::ChannelAftertouch => Bucket::Controller,
        EventKind::Meta(
            MetaKind::Marker
            | MetaKind::DeviceSwitch
            | MetaKind::SongBegin
            | MetaKind::LoopStart
            | MetaKind::LoopEnd
            | MetaKind::LoopStackBegin
            | MetaKind::LoopStackEnd
            | MetaKind::LoopStackBreak,
        ) => Bucket::Marker,
        _ => Bucket::Other,
    }
}

/// Stable-sorts one row: SysEx, note-offs, markers and loop points,
/// controllers, then everything else.
///
/// A note-off whose note is switched on in the same row goes after the
/// note-on when the note was not sounding before the row, and so does any
/// second note-off for that note. Otherwise a zero-length note would be
/// released before it starts and hang.
pub(crate) fn sort_events(events: &mut Vec<MidiEvent>, states: &mut NoteStates) {
    let mut buckets: [Vec<MidiEvent>; 5] = Default::default();
    for event in events.drain(..) {
        buckets[bucket(&event) as usize].push(event);
    }
    let [sysex, mut note_offs, markers, controllers, mut other] = buckets;

    let mut mark_as_on = Vec::new();
    let note_ons: Vec<(u8, u8, usize)> = other
        .iter()
        .filter(|e| e.kind == EventKind::NoteOn)
        .map(|e| (e.channel, e.byte(0), NoteStates::index(e)))
        .collect();

    for (channel, key, index) in note_ons {
        let was_on = states.0[index];
        mark_as_on.push(index);
        let mut same_note_offs = 0;
        let mut i = 0;
        while i < note_offs.len() {
            let off = &note_offs[i];
            if off.channel == channel && off.byte(0) == key {
                if !was_on || same_note_offs != 0 {
                    other.push(note_offs.remove(i));
                    mark_as_on.retain(|&n| n != index);
                    continue;
                }
                same_note_offs += 1;
            }
            i += 1;
        }
    }

    for off in &note_offs {
        states.0[NoteStates::index(off)] = false;
    }
    for index in mark_as_on {
        states.0[index] = true;
    }

    events.extend(sysex);
    events.extend(note_offs);
    events.extend(markers);
    events.extend(controllers);
    events.extend(other);
}

#[derive(Default)]
struct LoopScan {
    got_start: bool,
    got_end: bool,
    got_stack_start: bool,
    event_in_row: bool,
    stack_level: i32,
}

/// Builds rows for every raw track.
///
/// `leading_delta` is false for formats whose first event has no delta
/// time. `inv_division` scales tempo payloads to seconds per tick.
pub fn build_track_data(
    raw_tracks: &[Vec<u8>],
    leading_delta: bool,
    inv_division: Fraction,
    ctx: &mut ParserContext,
) -> Result<TrackData> {
    let mut data = TrackData::default();
    let mut scan = LoopScan {
        stack_level: -1,
        ..Default::default()
    };
    let mut song_ticks = 0u64;

    for (tk, raw) in raw_tracks.iter().enumerate() {
        let mut cursor = ByteCursor::new(raw);
        let mut status = 0u8;
        let mut states = NoteStates::new();
        let mut rows = Vec::new();

        let mut first = Row::new(0);
        if leading_delta {
            first.delay = cursor.read_varlen().ok_or_else(|| Error::TrackData {
                details: format!("Can't read variable-length value at begin of track {tk}."),
            })?;
        }
        if tk == 0 {
            first.events.push(MidiEvent::meta(MetaKind::SongBegin, &[]));
        }
        let mut abs = first.delay;
        rows.push(first);

        let mut row = Row::new(abs);
        loop {
            let event = ctx.parse_event(&mut cursor, &mut status);
            let mut at_end = event.is_end_of_track();
            if let Some(kind) = event.kind.meta() {
                scan_meta(&mut data, &mut scan, kind, &event, abs, inv_division);
            }
            row.events.push(event);

            if !at_end {
                match cursor.read_varlen() {
                    Some(delay) => row.delay = delay,
                    None => {
                        row.events.push(MidiEvent::end_of_track());
                        at_end = true;
                    }
                }
            }

            if row.delay > 0 || at_end {
                row.abs_tick = abs;
                abs = abs.saturating_add(row.delay);
                sort_events(&mut row.events, &mut states);
                rows.push(mem::replace(&mut row, Row::new(abs)));
                scan.event_in_row = false;
            }
            if at_end {
                break;
            }
        }

        song_ticks = song_ticks.max(abs);
        debug!(track = tk, rows = rows.len(), ticks = abs, "Track built");
        data.tracks.push(rows);
    }

    if scan.got_start && !scan.got_end {
        data.loop_end_tick = song_ticks;
    }
    if data.loop_start_tick >= data.loop_end_tick {
        if scan.got_start || scan.got_end {
            warn!(
                start = data.loop_start_tick,
                end = data.loop_end_tick,
                "Invalid loop detected: loop end is before loop start"
            );
        }
        data.invalid_loop = true;
    }
    Ok(data)
}

fn scan_meta(
    data: &mut TrackData,
    scan: &mut LoopScan,
    kind: MetaKind,
    event: &MidiEvent,
    abs: u64,
    inv_division: Fraction,
) {
    match kind {
        MetaKind::TempoChange => data.tempos.push(TempoChange {
            tick: abs,
            tempo: inv_division * Fraction::from_int(read_be(&event.data)),
        }),
        _ if data.invalid_loop => {}
        MetaKind::LoopStart => {
            if scan.got_start || scan.event_in_row {
                warn!(tick = abs, "Invalid loop detected: repeated or misplaced loop start");
                data.invalid_loop = true;
            } else {
                scan.got_start = true;
                data.loop_start_tick = abs;
            }
            scan.event_in_row = true;
        }
        MetaKind::LoopEnd => {
            if scan.got_end || scan.event_in_row {
                warn!(
                    tick = abs,
                    repeated = scan.got_end,
                    same_row = scan.event_in_row,
                    "Invalid loop detected: repeated or misplaced loop end"
                );
                data.invalid_loop = true;
            } else {
                scan.got_end = true;
                data.loop_end_tick = abs;
            }
            scan.event_in_row = true;
        }
        MetaKind::LoopStackBegin => {
            if !scan.got_stack_start {
                if !scan.got_start {
                    data.loop_start_tick = abs;
                }
                scan.got_stack_start = true;
            }
            scan.stack_level += 1;
            if scan.stack_level as usize >= data.loop_stack.len() {
                data.loop_stack.push(LoopStackEntry::new(event.byte(0), abs));
            }
        }
        MetaKind::LoopStackEnd | MetaKind::LoopStackBreak => {
            let level = usize::try_from(scan.stack_level).ok();
            match level.and_then(|l| data.loop_stack.get_mut(l)) {
                Some(entry) => {
                    entry.end = abs;
                    data.loop_end_tick = data.loop_end_tick.max(abs);
                    scan.stack_level -= 1;
                }
                None => {
                    warn!(tick = abs, "Invalid loop detected: loop end without loop start");
                    data.invalid_loop = true;
                }
            }
        }
        _ => {}
    }
}
