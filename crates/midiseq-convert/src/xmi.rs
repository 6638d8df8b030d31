//! AIL XMIDI to Standard MIDI File conversion.
//!
//! An XMIDI container (`FORM`/`XDIR` followed by `CAT `/`XMID`) carries one
//! `FORM XMID` block per song. Each song's `EVNT` chunk is converted into its
//! own format-0 SMF.

use byteorder::{BigEndian, ByteOrder};
use midly::num::{u14, u7};
use midly::{MetaMessage, MidiMessage, PitchBend, TrackEventKind};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::smf::{channel_event, data7, write_single_track, TimedEvent};

/// Ticks per quarter note of the produced SMFs.
pub const XMI_TICKS_PER_QUARTER: u16 = 60;
/// Tempo of the produced SMFs. Together with 60 ticks per quarter this is
/// the native 120 Hz XMIDI clock.
pub const XMI_TEMPO_US: u32 = 500_000;

/// IFF chunk view.
#[derive(Debug, Clone, Copy)]
struct Chunk<'a> {
    id: &'a [u8],
    body: &'a [u8],
}

/// Iterates the IFF chunks of `data`, honouring the even-length padding.
fn chunks(data: &[u8]) -> impl Iterator<Item = Chunk<'_>> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let header = data.get(pos..pos + 8)?;
        let len = BigEndian::read_u32(&header[4..8]) as usize;
        let start = pos + 8;
        let end = start.saturating_add(len).min(data.len());
        pos = end + (len & 1);
        Some(Chunk {
            id: &header[0..4],
            body: &data[start..end],
        })
    })
}

/// Finds the `EVNT` payload of every song in the container.
fn song_events(data: &[u8]) -> Result<Vec<&[u8]>> {
    if data.len() < 14 {
        return Err(Error::TooShort);
    }
    if &data[0..4] != b"FORM" || &data[8..12] != b"XDIR" {
        return Err(Error::InvalidSignature("FORM/XDIR"));
    }

    let mut songs = Vec::new();
    for top in chunks(data) {
        let body = match top.id {
            b"FORM" if top.body.starts_with(b"XDIR") => {
                if let Some(info) = chunks(&top.body[4..]).find(|c| c.id == b"INFO") {
                    if info.body.len() >= 2 {
                        let declared = u16::from_le_bytes([info.body[0], info.body[1]]);
                        debug!("XMI: {} songs declared", declared);
                    }
                }
                continue;
            }
            b"CAT " if top.body.starts_with(b"XMID") => &top.body[4..],
            _ => continue,
        };

        for form in chunks(body) {
            if form.id != b"FORM" || !form.body.starts_with(b"XMID") {
                continue;
            }
            if let Some(evnt) = chunks(&form.body[4..]).find(|c| c.id == b"EVNT") {
                songs.push(evnt.body);
            }
        }
    }

    if songs.is_empty() {
        return Err(Error::NoSongs);
    }
    Ok(songs)
}

/// Byte cursor over one `EVNT` chunk.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self, context: &'static str) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(Error::UnexpectedEof { context })?;
        self.pos += 1;
        Ok(b)
    }

    fn varlen(&mut self, context: &'static str) -> Result<u64> {
        let mut value = 0u64;
        loop {
            let b = self.byte(context)?;
            value = (value << 7) | u64::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn slice(&mut self, len: u64, context: &'static str) -> Result<&'a [u8]> {
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof { context })?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::UnexpectedEof { context })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }
}

fn convert_song(evnt: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader {
        data: evnt,
        pos: 0,
    };
    let mut events: Vec<TimedEvent<'_>> = Vec::new();
    let mut tick = 0u64;

    while reader.pos < evnt.len() {
        let status = reader.byte("XMI event")?;
        if status < 0x80 {
            // Interval bytes accumulate until the next status byte
            tick = tick.saturating_add(u64::from(status));
            continue;
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x90 => {
                let key = reader.byte("XMI note")?;
                let vel = reader.byte("XMI note velocity")?;
                let duration = reader.varlen("XMI note duration")?;
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        channel,
                        MidiMessage::NoteOn {
                            key: data7(key),
                            vel: data7(vel),
                        },
                    ),
                ));
                events.push(TimedEvent::release(
                    tick.saturating_add(duration),
                    channel_event(
                        channel,
                        MidiMessage::NoteOff {
                            key: data7(key),
                            vel: u7::new(0),
                        },
                    ),
                ));
            }
            0x80 | 0xA0 | 0xB0 | 0xE0 => {
                let a = reader.byte("XMI channel event")?;
                let b = reader.byte("XMI channel event")?;
                let message = match status & 0xF0 {
                    0x80 => MidiMessage::NoteOff {
                        key: data7(a),
                        vel: data7(b),
                    },
                    0xA0 => MidiMessage::Aftertouch {
                        key: data7(a),
                        vel: data7(b),
                    },
                    0xB0 => MidiMessage::Controller {
                        controller: data7(a),
                        value: data7(b),
                    },
                    _ => MidiMessage::PitchBend {
                        bend: PitchBend(u14::new(
                            (u16::from(b & 0x7F) << 7) | u16::from(a & 0x7F),
                        )),
                    },
                };
                events.push(TimedEvent::new(tick, channel_event(channel, message)));
            }
            0xC0 => {
                let program = reader.byte("XMI program change")?;
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        channel,
                        MidiMessage::ProgramChange {
                            program: data7(program),
                        },
                    ),
                ));
            }
            0xD0 => {
                let pressure = reader.byte("XMI channel pressure")?;
                events.push(TimedEvent::new(
                    tick,
                    channel_event(
                        channel,
                        MidiMessage::ChannelAftertouch {
                            vel: data7(pressure),
                        },
                    ),
                ));
            }
            _ => match status {
                0xFF => {
                    let kind = reader.byte("XMI meta type")?;
                    let len = reader.varlen("XMI meta length")?;
                    let data = reader.slice(len, "XMI meta data")?;
                    match kind {
                        0x2F => break,
                        // The output clock is fixed; XMI tempo is not carried over
                        0x51 => trace!("XMI: dropping tempo meta"),
                        _ => events.push(TimedEvent::new(
                            tick,
                            TrackEventKind::Meta(meta_message(kind, data)),
                        )),
                    }
                }
                0xF0 | 0xF7 => {
                    let len = reader.varlen("XMI sysex length")?;
                    let data = reader.slice(len, "XMI sysex data")?;
                    let kind = if status == 0xF0 {
                        TrackEventKind::SysEx(data)
                    } else {
                        TrackEventKind::Escape(data)
                    };
                    events.push(TimedEvent::new(tick, kind));
                }
                _ => {
                    trace!("XMI: stopping at unsupported status {:#04x}", status);
                    break;
                }
            },
        }
    }

    write_single_track(events, XMI_TICKS_PER_QUARTER, XMI_TEMPO_US)
}

fn meta_message(kind: u8, data: &[u8]) -> MetaMessage<'_> {
    match kind {
        0x01 => MetaMessage::Text(data),
        0x02 => MetaMessage::Copyright(data),
        0x03 => MetaMessage::TrackName(data),
        0x04 => MetaMessage::InstrumentName(data),
        0x05 => MetaMessage::Lyric(data),
        0x06 => MetaMessage::Marker(data),
        0x07 => MetaMessage::CuePoint(data),
        _ => MetaMessage::Unknown(kind, data),
    }
}

/// Converts every song of an XMIDI container into its own format-0 SMF.
pub fn xmi_to_midi(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let songs = song_events(data)?;
    debug!("XMI: converting {} songs", songs.len());
    songs.into_iter().map(convert_song).collect()
}
