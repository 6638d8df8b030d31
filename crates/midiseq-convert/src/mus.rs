//! DMX MUS to Standard MIDI File conversion.
//!
//! MUS scores run on a fixed 140 Hz clock. The output uses 70 ticks per
//! quarter note at 500000 µs per quarter, which keeps one MUS tick equal to
//! one SMF tick.

use byteorder::{ByteOrder, LittleEndian};
use midly::num::{u14, u7};
use midly::{MidiMessage, PitchBend};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::smf::{channel_event, data7, write_single_track, TimedEvent};

/// Ticks per quarter note of the produced SMF.
pub const MUS_TICKS_PER_QUARTER: u16 = 70;
/// Tempo of the produced SMF in microseconds per quarter note.
pub const MUS_TEMPO_US: u32 = 500_000;

const MUS_SIGNATURE: &[u8; 4] = b"MUS\x1A";
const MUS_HEADER_LEN: usize = 16;
const MUS_PERCUSSION: u8 = 15;
const MIDI_PERCUSSION: u8 = 9;

/// MUS controller number to MIDI controller number. Entry 0 is the program
/// change and is handled separately.
const CONTROLLER_MAP: [u8; 15] = [0, 0, 1, 7, 10, 11, 91, 93, 64, 67, 120, 123, 126, 127, 121];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MusEvent {
    ReleaseNote,
    PlayNote,
    PitchBend,
    SystemEvent,
    Controller,
    MeasureEnd,
    ScoreEnd,
    Unused,
}

impl MusEvent {
    fn from_descriptor(descriptor: u8) -> Self {
        match (descriptor >> 4) & 0x07 {
            0 => Self::ReleaseNote,
            1 => Self::PlayNote,
            2 => Self::PitchBend,
            3 => Self::SystemEvent,
            4 => Self::Controller,
            5 => Self::MeasureEnd,
            6 => Self::ScoreEnd,
            _ => Self::Unused,
        }
    }
}

/// Assigns MIDI channels to MUS channels in order of first use.
#[derive(Debug)]
struct ChannelMap {
    map: [Option<u8>; 16],
    next: u8,
}

impl ChannelMap {
    fn new() -> Self {
        Self {
            map: [None; 16],
            next: 0,
        }
    }

    /// Returns the MIDI channel and whether it was allocated just now.
    fn resolve(&mut self, mus_channel: u8) -> (u8, bool) {
        if mus_channel == MUS_PERCUSSION {
            return (MIDI_PERCUSSION, false);
        }
        let slot = &mut self.map[usize::from(mus_channel & 0x0F)];
        if let Some(channel) = *slot {
            return (channel, false);
        }
        if self.next == MIDI_PERCUSSION {
            self.next += 1;
        }
        let channel = self.next.min(15);
        self.next = self.next.saturating_add(1);
        *slot = Some(channel);
        (channel, true)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self, context: &'static str) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(Error::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(b)
    }

    fn delay(&mut self) -> Result<u64> {
        let mut value = 0u64;
        loop {
            let b = self.byte("MUS delay")?;
            value = (value << 7) | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
    }
}

/// Converts a DMX MUS score into a format-0 SMF.
pub fn mus_to_midi(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < MUS_HEADER_LEN {
        return Err(Error::TooShort);
    }
    if &data[0..4] != MUS_SIGNATURE {
        return Err(Error::InvalidSignature("MUS\\x1A"));
    }

    let score_len = usize::from(LittleEndian::read_u16(&data[4..6]));
    let score_start = usize::from(LittleEndian::read_u16(&data[6..8]));
    let primary = LittleEndian::read_u16(&data[8..10]);
    let secondary = LittleEndian::read_u16(&data[10..12]);
    let instruments = LittleEndian::read_u16(&data[12..14]);
    debug!(
        "MUS score: {} bytes at {}, {} primary / {} secondary channels, {} instruments",
        score_len, score_start, primary, secondary, instruments
    );

    if score_start > data.len() {
        return Err(Error::UnexpectedEof {
            context: "MUS score start",
        });
    }
    // Some files declare a zero or oversized score length; read to the end then.
    let score_end = match score_start.checked_add(score_len) {
        Some(end) if score_len > 0 && end <= data.len() => end,
        _ => data.len(),
    };

    let mut reader = Reader {
        data: &data[score_start..score_end],
        pos: 0,
    };
    let mut channels = ChannelMap::new();
    let mut volumes = [127u8; 16];
    let mut events = Vec::new();
    let mut tick = 0u64;

    loop {
        let descriptor = reader.byte("MUS event")?;
        let mus_channel = descriptor & 0x0F;
        let kind = MusEvent::from_descriptor(descriptor);

        if kind == MusEvent::ScoreEnd {
            break;
        }

        let channel = if matches!(kind, MusEvent::MeasureEnd | MusEvent::Unused) {
            None
        } else {
            let (channel, fresh) = channels.resolve(mus_channel);
            if fresh {
                // Newly allocated channels start silenced
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        channel,
                        MidiMessage::Controller {
                            controller: data7(123),
                            value: u7::new(0),
                        },
                    ),
                ));
            }
            Some(channel)
        };

        match (kind, channel) {
            (MusEvent::ReleaseNote, Some(ch)) => {
                let key = reader.byte("MUS release note")?;
                events.push(TimedEvent::release(
                    tick,
                    channel_event(
                        ch,
                        MidiMessage::NoteOff {
                            key: data7(key),
                            vel: u7::new(0),
                        },
                    ),
                ));
            }
            (MusEvent::PlayNote, Some(ch)) => {
                let key = reader.byte("MUS play note")?;
                if key & 0x80 != 0 {
                    volumes[usize::from(mus_channel)] = reader.byte("MUS note volume")? & 0x7F;
                }
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        ch,
                        MidiMessage::NoteOn {
                            key: data7(key),
                            vel: data7(volumes[usize::from(mus_channel)]),
                        },
                    ),
                ));
            }
            (MusEvent::PitchBend, Some(ch)) => {
                let bend = u16::from(reader.byte("MUS pitch bend")?) * 64;
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        ch,
                        MidiMessage::PitchBend {
                            bend: PitchBend(u14::new(bend & 0x3FFF)),
                        },
                    ),
                ));
            }
            (MusEvent::SystemEvent, Some(ch)) => {
                let number = reader.byte("MUS system event")?;
                if (10..=14).contains(&number) {
                    events.push(TimedEvent::new(
                        tick,
                        channel_event(
                            ch,
                            MidiMessage::Controller {
                                controller: data7(CONTROLLER_MAP[usize::from(number)]),
                                value: u7::new(0),
                            },
                        ),
                    ));
                } else {
                    trace!("MUS: ignoring system event {}", number);
                }
            }
            (MusEvent::Controller, Some(ch)) => {
                let number = reader.byte("MUS controller")?;
                let value = reader.byte("MUS controller value")?.min(127);
                let message = match number {
                    0 => Some(MidiMessage::ProgramChange {
                        program: data7(value),
                    }),
                    1..=9 => Some(MidiMessage::Controller {
                        controller: data7(CONTROLLER_MAP[usize::from(number)]),
                        value: data7(value),
                    }),
                    _ => {
                        trace!("MUS: ignoring controller {}", number);
                        None
                    }
                };
                if let Some(message) = message {
                    events.push(TimedEvent::new(tick, channel_event(ch, message)));
                }
            }
            _ => {}
        }

        if descriptor & 0x80 != 0 {
            tick = tick.saturating_add(reader.delay()?);
        }
    }

    write_single_track(events, MUS_TICKS_PER_QUARTER, MUS_TEMPO_US)
}
