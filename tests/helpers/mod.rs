//! Shared test fixtures: a recording synth interface and SMF builders.

#![allow(dead_code)]

pub mod tolerances;

use midiseq::{MetaKind, MidiRtInterface};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// One callback received by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    Patch { channel: u8, patch: u8 },
    PitchBend { channel: u8, msb: u8, lsb: u8 },
    SysEx(Vec<u8>),
    Meta(MetaKind),
    RawOpl { register: u8, value: u8 },
    LoopStart,
    LoopEnd,
    SongStart,
}

/// Interface that logs every callback in arrival order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub calls: Vec<Call>,
}

impl Recorder {
    pub fn note_ons(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::NoteOn { note, .. } => Some(*note),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl MidiRtInterface for Recorder {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.calls.push(Call::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.calls.push(Call::NoteOff { channel, note });
    }

    fn note_aftertouch(&mut self, _channel: u8, _note: u8, _pressure: u8) {}

    fn channel_aftertouch(&mut self, _channel: u8, _pressure: u8) {}

    fn controller_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.calls.push(Call::Controller {
            channel,
            controller,
            value,
        });
    }

    fn patch_change(&mut self, channel: u8, patch: u8) {
        self.calls.push(Call::Patch { channel, patch });
    }

    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8) {
        self.calls.push(Call::PitchBend { channel, msb, lsb });
    }

    fn system_exclusive(&mut self, data: &[u8]) {
        self.calls.push(Call::SysEx(data.to_vec()));
    }

    fn meta_event(&mut self, kind: MetaKind, _data: &[u8]) {
        self.calls.push(Call::Meta(kind));
    }

    fn raw_opl(&mut self, register: u8, value: u8) {
        self.calls.push(Call::RawOpl { register, value });
    }

    fn loop_start(&mut self) {
        self.calls.push(Call::LoopStart);
    }

    fn loop_end(&mut self) {
        self.calls.push(Call::LoopEnd);
    }

    fn song_start(&mut self) {
        self.calls.push(Call::SongStart);
    }
}

/// Ticks per quarter note used by every fixture.
pub const DIVISION: u16 = 480;

/// Event placed at an absolute tick, converted to deltas by [`smf`].
pub struct At<'a> {
    pub tick: u32,
    pub kind: TrackEventKind<'a>,
}

pub fn note_on(tick: u32, channel: u8, key: u8, vel: u8) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

pub fn note_off(tick: u32, channel: u8, key: u8) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        },
    }
}

pub fn controller(tick: u32, channel: u8, number: u8, value: u8) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::Controller {
                controller: u7::new(number),
                value: u7::new(value),
            },
        },
    }
}

pub fn tempo(tick: u32, us_per_quarter: u32) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_quarter))),
    }
}

pub fn marker(tick: u32, text: &'static [u8]) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Meta(MetaMessage::Marker(text)),
    }
}

pub fn text(tick: u32, text: &'static [u8]) -> At<'static> {
    At {
        tick,
        kind: TrackEventKind::Meta(MetaMessage::Text(text)),
    }
}

/// Serializes tracks of absolute-tick events into a format 0/1 SMF.
///
/// Events are taken in the order given; ticks must not decrease within a
/// track. Every track is closed with End of Track at `end_tick`.
pub fn smf(tracks: Vec<Vec<At<'_>>>, end_tick: u32) -> Vec<u8> {
    let format = if tracks.len() == 1 {
        Format::SingleTrack
    } else {
        Format::Parallel
    };
    let tracks = tracks
        .into_iter()
        .map(|events| {
            let mut last = 0u32;
            let mut out: Vec<TrackEvent<'_>> = events
                .into_iter()
                .map(|at| {
                    let delta = at.tick - last;
                    last = at.tick;
                    TrackEvent {
                        delta: u28::new(delta),
                        kind: at.kind,
                    }
                })
                .collect();
            out.push(TrackEvent {
                delta: u28::new(end_tick.saturating_sub(last)),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            out
        })
        .collect();
    let smf = Smf {
        header: Header::new(format, Timing::Metrical(u15::new(DIVISION))),
        tracks,
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

/// Four quarter notes (C D E F) at 120 BPM: two seconds of music.
pub fn four_notes() -> Vec<u8> {
    smf(
        vec![vec![
            note_on(0, 0, 60, 100),
            note_off(480, 0, 60),
            note_on(480, 0, 62, 100),
            note_off(960, 0, 62),
            note_on(960, 0, 64, 100),
            note_off(1440, 0, 64),
            note_on(1440, 0, 65, 100),
            note_off(1920, 0, 65),
        ]],
        1920,
    )
}

/// [`four_notes`] with `loopStart` at beat 1 and `loopEnd` at beat 3.
pub fn looped_four_notes() -> Vec<u8> {
    smf(
        vec![vec![
            note_on(0, 0, 60, 100),
            note_off(480, 0, 60),
            marker(480, b"loopStart"),
            note_on(480, 0, 62, 100),
            note_off(960, 0, 62),
            note_on(960, 0, 64, 100),
            note_off(1440, 0, 64),
            marker(1440, b"loopEnd"),
            note_on(1440, 0, 65, 100),
            note_off(1920, 0, 65),
        ]],
        1920,
    )
}

/// Drives `tick` until the song ends or `max_steps` elapse, returning the
/// number of steps taken.
pub fn play_to_end<I: MidiRtInterface>(
    seq: &mut midiseq::Sequencer<I>,
    step: f64,
    max_steps: usize,
) -> usize {
    for n in 0..max_steps {
        if seq.at_end() {
            return n;
        }
        seq.tick(step, step / 10.0);
    }
    max_steps
}

/// Splits an SMF into the bodies of its `MTrk` chunks.
pub fn raw_tracks(smf: &[u8]) -> Vec<Vec<u8>> {
    let mut tracks = Vec::new();
    let mut pos = 14;
    while pos + 8 <= smf.len() {
        let len = u32::from_be_bytes([smf[pos + 4], smf[pos + 5], smf[pos + 6], smf[pos + 7]]);
        let body = pos + 8..pos + 8 + len as usize;
        if &smf[pos..pos + 4] == b"MTrk" {
            tracks.push(smf[body.clone()].to_vec());
        }
        pos = body.end;
    }
    tracks
}

/// Routes engine logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
