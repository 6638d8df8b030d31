//! Playback position snapshots.
//!
//! A [`Position`] is a plain value: cloning it captures song begin, loop
//! begin or a nested loop entry, and assigning it back restores that point.

use crate::event::EventKind;
use crate::fraction::Fraction;
use crate::track::Row;

/// What the cursor last did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorState {
    #[default]
    Idle,
    /// Last dispatched channel event type.
    Handled(EventKind),
    /// End of track reached; the cursor no longer advances.
    Ended,
}

/// Per-track playback cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackCursor {
    /// Ticks until the row under `row` is due.
    pub delay: u64,
    pub state: CursorState,
    /// Index of the next row to dispatch.
    pub row: usize,
}

impl TrackCursor {
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state != CursorState::Ended
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Position {
    pub tracks: Vec<TrackCursor>,
    /// Seconds until the next row is due.
    pub wait: f64,
    /// Seconds since song begin, as reported by `tell()`.
    pub abs_time: f64,
    /// Seconds per tick in effect at this point.
    pub tempo: Fraction,
}

impl Position {
    /// Song-begin position over `tracks`. Empty tracks start ended.
    pub fn begin(tracks: &[Vec<Row>], tempo: Fraction) -> Self {
        Self {
            tracks: tracks
                .iter()
                .map(|rows| TrackCursor {
                    state: if rows.is_empty() {
                        CursorState::Ended
                    } else {
                        CursorState::Idle
                    },
                    ..Default::default()
                })
                .collect(),
            wait: 0.0,
            abs_time: 0.0,
            tempo,
        }
    }

    /// Smallest pending delay among live tracks, or `None` when every
    /// track has ended.
    pub fn shortest_delay(&self) -> Option<u64> {
        self.tracks
            .iter()
            .filter(|c| c.is_live())
            .map(|c| c.delay)
            .min()
    }

    /// Advances every cursor by `ticks`.
    pub fn consume(&mut self, ticks: u64) {
        for cursor in &mut self.tracks {
            cursor.delay = cursor.delay.saturating_sub(ticks);
        }
    }
}
