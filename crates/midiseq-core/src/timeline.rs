//! Timeline builder.
//!
//! Converts tick deltas into seconds with exact rational arithmetic. Tempo
//! changes are global: a change collected on any track retimes every
//! track from its tick on. After timing, a muted dry run over all tracks
//! finds the multi-track position at which the loop start is reached.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bytes::read_be;
use crate::event::MetaKind;
use crate::fraction::Fraction;
use crate::position::{CursorState, Position};
use crate::track::{TempoChange, TrackData};

/// A text marker that was not rewritten into a loop event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub label: String,
    pub tick: u64,
    /// Seconds from song begin.
    pub time: f64,
}

/// Result of [`build_timeline`].
#[derive(Debug, Clone)]
pub struct Timeline {
    /// Song length in seconds, including the post-song wait.
    pub length: f64,
    /// -1.0 when there is no valid loop.
    pub loop_start_time: f64,
    /// -1.0 when there is no valid loop.
    pub loop_end_time: f64,
    pub markers: Vec<Marker>,
    pub track_begin: Position,
    pub loop_begin: Position,
}

/// Times every row of `data` in place.
///
/// `initial_tempo` is the tempo in seconds per tick before the first tempo
/// change; `inv_division` scales tempo payloads met during the dry run.
pub fn build_timeline(
    data: &mut TrackData,
    initial_tempo: Fraction,
    inv_division: Fraction,
    post_song_wait: f64,
) -> Timeline {
    data.tempos.sort_by_key(|t| t.tick);

    // Without a usable loop start the whole song loops from its beginning.
    let track_begin = Position::begin(&data.tracks, initial_tempo);
    let mut timeline = Timeline {
        length: 0.0,
        loop_start_time: -1.0,
        loop_end_time: -1.0,
        markers: Vec::new(),
        loop_begin: track_begin.clone(),
        track_begin,
    };

    let mut max_time = Fraction::ZERO;
    for rows in &mut data.tracks {
        let mut current = initial_tempo;
        let mut time = Fraction::ZERO;
        let mut tempo_index = 0;

        for i in 0..rows.len() {
            if i > 0
                && data
                    .tempos
                    .get(tempo_index)
                    .is_some_and(|t| t.tick <= rows[i].abs_tick)
            {
                let abs = rows[i].abs_tick;
                let prev = &mut rows[i - 1];
                let mut points = vec![TempoChange {
                    tick: prev.abs_tick,
                    tempo: current,
                }];
                while let Some(change) = data.tempos.get(tempo_index).filter(|t| t.tick <= abs) {
                    points.push(*change);
                    tempo_index += 1;
                }

                let mut delta = Fraction::ZERO;
                for pair in points.windows(2) {
                    delta += pair[0].tempo.scale(pair[1].tick.saturating_sub(pair[0].tick));
                }
                if let Some(last) = points.last() {
                    delta += last.tempo.scale(abs.saturating_sub(last.tick));
                    current = last.tempo;
                }
                prev.time_delta = delta;
                time = prev.time + delta;
            }

            let row = &mut rows[i];
            row.time_delta = current.scale(row.delay);
            row.time = time;
            time += row.time_delta;

            let seconds = row.seconds();
            for event in &row.events {
                if event.is_meta(MetaKind::Marker) {
                    timeline.markers.push(Marker {
                        label: String::from_utf8_lossy(&event.data).into_owned(),
                        tick: row.abs_tick,
                        time: seconds,
                    });
                }
            }

            if !data.invalid_loop {
                if row.abs_tick == data.loop_start_tick {
                    timeline.loop_start_time = seconds;
                } else if row.abs_tick == data.loop_end_tick {
                    timeline.loop_end_time = seconds;
                }
            }
        }
        max_time = max_time.max(time);
    }
    timeline.length = max_time.to_f64() + post_song_wait;

    if !data.invalid_loop && !data.tracks.is_empty() {
        if let Some(mut begin) = scan_loop_begin(data, &timeline.track_begin, inv_division) {
            begin.abs_time = timeline.loop_start_time;
            timeline.loop_begin = begin;
        }
    }

    debug!(
        length = timeline.length,
        loop_start = timeline.loop_start_time,
        loop_end = timeline.loop_end_time,
        markers = timeline.markers.len(),
        "Timeline built"
    );
    timeline
}

/// Steps all tracks the way playback does until a row holding a loop start
/// is due, and returns the position at the beginning of that step.
fn scan_loop_begin(data: &TrackData, begin: &Position, inv_division: Fraction) -> Option<Position> {
    let mut pos = begin.clone();
    loop {
        let row_begin = pos.clone();
        let mut tempo = pos.tempo;
        for (tk, cursor) in pos.tracks.iter_mut().enumerate() {
            if !cursor.is_live() || cursor.delay > 0 {
                continue;
            }
            let Some(row) = data.tracks[tk].get(cursor.row) else {
                cursor.state = CursorState::Ended;
                continue;
            };
            for event in &row.events {
                match event.kind.meta() {
                    Some(MetaKind::LoopStart) => return Some(row_begin),
                    Some(MetaKind::TempoChange) => {
                        tempo = inv_division * Fraction::from_int(read_be(&event.data));
                    }
                    Some(MetaKind::EndOfTrack) => cursor.state = CursorState::Ended,
                    _ => {}
                }
            }
            if cursor.is_live() {
                cursor.delay += row.delay;
                cursor.row += 1;
            }
        }
        pos.tempo = tempo;

        let shortest = pos.shortest_delay()?;
        pos.consume(shortest);
    }
}
