//! Single-track SMF writer shared by the converters.
//!
//! Converters collect events at absolute tick positions; this module orders
//! them, turns absolute ticks into delta times and serializes the result with
//! `midly`.

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::Result;

/// Sort key applied to events sharing one tick. Releases go first so a
/// re-struck note is not cut by its own previous note-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Slot {
    Release,
    Regular,
}

/// One event scheduled at an absolute tick.
#[derive(Debug, Clone)]
pub(crate) struct TimedEvent<'a> {
    pub tick: u64,
    pub slot: Slot,
    pub kind: TrackEventKind<'a>,
}

impl<'a> TimedEvent<'a> {
    pub fn new(tick: u64, kind: TrackEventKind<'a>) -> Self {
        Self {
            tick,
            slot: Slot::Regular,
            kind,
        }
    }

    pub fn release(tick: u64, kind: TrackEventKind<'a>) -> Self {
        Self {
            tick,
            slot: Slot::Release,
            kind,
        }
    }
}

/// Channel message helper with 7-bit masking applied to every data byte.
pub(crate) fn channel_event<'a>(channel: u8, message: MidiMessage) -> TrackEventKind<'a> {
    TrackEventKind::Midi {
        channel: u4::new(channel & 0x0F),
        message,
    }
}

pub(crate) fn data7(value: u8) -> u7 {
    u7::new(value & 0x7F)
}

/// Serializes `events` as a format-0 SMF with a leading tempo meta and a
/// trailing end-of-track placed at the last scheduled tick.
pub(crate) fn write_single_track(
    mut events: Vec<TimedEvent<'_>>,
    ticks_per_quarter: u16,
    tempo_us: u32,
) -> Result<Vec<u8>> {
    // Stable: events with equal (tick, slot) keep their source order
    events.sort_by_key(|e| (e.tick, e.slot));

    let mut track = Vec::with_capacity(events.len() + 2);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_us & 0x00FF_FFFF))),
    });

    let mut last_tick = 0u64;
    for event in events {
        track.push(TrackEvent {
            delta: delta_ticks(event.tick - last_tick),
            kind: event.kind,
        });
        last_tick = event.tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(ticks_per_quarter & 0x7FFF)),
        ),
        tracks: vec![track],
    };

    let mut out = Vec::new();
    smf.write_std(&mut out)?;
    Ok(out)
}

fn delta_ticks(delta: u64) -> u28 {
    u28::new(delta.min(0x0FFF_FFFF) as u32)
}
