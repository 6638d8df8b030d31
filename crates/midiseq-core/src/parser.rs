//! Track event parser.
//!
//! Decodes one event at a time from raw track bytes, tracking running
//! status, collecting song metadata and rewriting loop-related
//! controllers and markers into the sequencer's private meta events.

use tracing::{debug, trace, warn};

use crate::bytes::ByteCursor;
use crate::event::{EventKind, MetaKind, MidiEvent};
use crate::format::FileFormat;

/// Which family of loop controllers the current song uses.
///
/// Latched by the first loop controller seen while parsing and only ever
/// changed through [`LoopConvention::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopConvention {
    /// Controllers are not interpreted as loop points (non-MIDI sources).
    Off,
    /// MIDI source, no loop controller seen yet.
    #[default]
    Unset,
    /// CC111 marks the loop start and the song loops from its end.
    RpgMaker,
    /// CC110 starts the loop and CC111 ends it.
    Hmi,
    /// CC110 seen twice; CC113 acts as channel volume.
    Emidi,
    /// XMIDI for-loop controllers (CC116/CC117) and callback triggers (CC119).
    Xmi,
}

/// What to do with one controller event under the current convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerAction {
    Keep,
    /// Rewrite the controller number.
    Remap(u8),
    LoopStart,
    LoopEnd,
    StackBegin(u8),
    StackEnd,
    StackBreak,
    Callback(u8),
}

impl LoopConvention {
    /// Initial convention for songs of `format`.
    pub fn for_format(format: FileFormat) -> Self {
        match format {
            FileFormat::Midi => Self::Unset,
            FileFormat::Xmidi => Self::Xmi,
            _ => Self::Off,
        }
    }

    /// Classifies controller `number` with `value`, returning the latched
    /// convention and the action for this event.
    pub fn classify(self, number: u8, value: u8) -> (Self, ControllerAction) {
        use ControllerAction as A;
        match (self, number) {
            (Self::Unset, 110) => (Self::Hmi, A::LoopStart),
            (Self::Unset, 111) => (Self::RpgMaker, A::LoopStart),
            (Self::RpgMaker, 111) => (self, A::LoopStart),
            (Self::Hmi, 110) => (Self::Emidi, A::Keep),
            (Self::Hmi, 111) => (self, A::LoopEnd),
            (Self::Emidi, 113) => (self, A::Remap(7)),
            (Self::Xmi, 116) => (self, A::StackBegin(value)),
            (Self::Xmi, 117) if value < 64 => (self, A::StackBreak),
            (Self::Xmi, 117) => (self, A::StackEnd),
            (Self::Xmi, 119) => (self, A::Callback(value)),
            _ => (self, A::Keep),
        }
    }
}

/// Per-load parser state: the loop convention latch and text metadata.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    pub format: FileFormat,
    pub convention: LoopConvention,
    pub title: String,
    pub copyright: String,
    pub track_titles: Vec<String>,
}

impl ParserContext {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            convention: LoopConvention::for_format(format),
            ..Default::default()
        }
    }

    fn note_text(&mut self, kind: MetaKind, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        match kind {
            MetaKind::Copyright if self.copyright.is_empty() => {
                debug!("Music copyright: {text}");
                self.copyright = text.into_owned();
            }
            MetaKind::Copyright => debug!("Extra copyright event: {text}"),
            MetaKind::TrackTitle if self.title.is_empty() => {
                debug!("Music title: {text}");
                self.title = text.into_owned();
            }
            MetaKind::TrackTitle => {
                debug!("Track title: {text}");
                self.track_titles.push(text.into_owned());
            }
            MetaKind::InstrumentTitle => debug!("Instrument: {text}"),
            _ => {}
        }
    }

    /// Reads the next event. `status` carries running status between calls.
    ///
    /// Data ending in the middle of an event yields an end-of-track event
    /// so the track closes cleanly.
    pub fn parse_event(&mut self, cursor: &mut ByteCursor<'_>, status: &mut u8) -> MidiEvent {
        match self.try_parse_event(cursor, status) {
            Some(event) => event,
            None => {
                warn!(
                    offset = cursor.position(),
                    "Unexpected end of track data, closing track"
                );
                MidiEvent::end_of_track()
            }
        }
    }

    fn try_parse_event(&mut self, cursor: &mut ByteCursor<'_>, status: &mut u8) -> Option<MidiEvent> {
        let Some(mut byte) = cursor.peek() else {
            return Some(MidiEvent::end_of_track());
        };
        // Data bytes in status position reuse the running status.
        if byte < 0x80 {
            byte = *status | 0x80;
        } else {
            cursor.read_u8()?;
        }

        if byte == 0xF0 || byte == 0xF7 {
            let length = cursor.read_varlen()?;
            let payload = cursor.read_slice_u64(length)?;
            let mut event = MidiEvent::new(EventKind::SysEx, 0, &[byte]);
            event.data.extend_from_slice(payload);
            return Some(event);
        }

        if byte == 0xFF {
            let subtype = cursor.read_u8()?;
            let length = cursor.read_varlen()?;
            let data = cursor.read_slice_u64(length)?;
            return Some(self.meta_event(MetaKind::from_code(subtype), data));
        }

        match byte {
            0xF3 => {
                let d = cursor.read_slice(1)?;
                return Some(MidiEvent::new(EventKind::SongSelect, 0, d));
            }
            0xF2 => {
                let d = cursor.read_slice(2)?;
                return Some(MidiEvent::new(EventKind::SongPositionPointer, 0, d));
            }
            0xF0..=0xFF => {
                // Stays the running status; stray data bytes after it are read as delta time.
                *status = byte;
                return Some(MidiEvent::new(EventKind::System(byte), 0, &[]));
            }
            _ => {}
        }

        *status = byte;
        let channel = byte & 0x0F;
        let kind = match byte >> 4 {
            0x8 => EventKind::NoteOff,
            0x9 => EventKind::NoteOn,
            0xA => EventKind::NoteTouch,
            0xB => EventKind::ControlChange,
            0xC => EventKind::PatchChange,
            0xD => EventKind::ChannelAftertouch,
            _ => EventKind::PitchBend,
        };

        if matches!(kind, EventKind::PatchChange | EventKind::ChannelAftertouch) {
            let d = cursor.read_slice(1)?;
            return Some(MidiEvent::new(kind, channel, d));
        }

        let d = cursor.read_slice(2)?;
        let mut event = MidiEvent::new(kind, channel, d);
        match kind {
            EventKind::NoteOn if d[1] == 0 => event.kind = EventKind::NoteOff,
            EventKind::ControlChange => self.apply_loop_convention(&mut event),
            _ => {}
        }
        Some(event)
    }

    fn apply_loop_convention(&mut self, event: &mut MidiEvent) {
        let (number, value) = (event.byte(0), event.byte(1));
        let (next, action) = self.convention.classify(number, value);
        if next != self.convention {
            debug!(from = ?self.convention, to = ?next, "Loop convention latched");
            self.convention = next;
        }
        let rewrite = |event: &mut MidiEvent, kind: MetaKind, data: &[u8]| {
            event.kind = EventKind::Meta(kind);
            event.data.clear();
            event.data.extend_from_slice(data);
        };
        match action {
            ControllerAction::Keep => {}
            ControllerAction::Remap(to) => event.data[0] = to,
            ControllerAction::LoopStart => rewrite(event, MetaKind::LoopStart, &[]),
            ControllerAction::LoopEnd => rewrite(event, MetaKind::LoopEnd, &[]),
            ControllerAction::StackBegin(loops) => {
                trace!(loops, "Stack loop start controller");
                rewrite(event, MetaKind::LoopStackBegin, &[loops]);
            }
            ControllerAction::StackEnd => rewrite(event, MetaKind::LoopStackEnd, &[]),
            ControllerAction::StackBreak => rewrite(event, MetaKind::LoopStackBreak, &[]),
            ControllerAction::Callback(value) => rewrite(event, MetaKind::CallbackTrigger, &[value]),
        }
    }

    fn meta_event(&mut self, kind: MetaKind, data: &[u8]) -> MidiEvent {
        match kind {
            MetaKind::Copyright | MetaKind::TrackTitle | MetaKind::InstrumentTitle => {
                self.note_text(kind, data);
            }
            MetaKind::Marker => {
                if let Some(event) = marker_loop_event(data) {
                    return event;
                }
            }
            _ => {}
        }
        MidiEvent::meta(kind, data)
    }
}

/// Recognizes the `loopstart`, `loopend`, `loopstart=N` and `loopend=`
/// text markers, compared case-insensitively.
fn marker_loop_event(data: &[u8]) -> Option<MidiEvent> {
    let text = data.to_ascii_lowercase();
    if text == b"loopstart" {
        return Some(MidiEvent::meta(MetaKind::LoopStart, &[]));
    }
    if text == b"loopend" {
        return Some(MidiEvent::meta(MetaKind::LoopEnd, &[]));
    }
    if let Some(count) = text.strip_prefix(b"loopstart=") {
        let loops = leading_number(count);
        trace!(loops, "Stack loop start marker");
        return Some(MidiEvent::meta(MetaKind::LoopStackBegin, &[loops]));
    }
    if text.starts_with(b"loopend=") {
        return Some(MidiEvent::meta(MetaKind::LoopStackEnd, &[]));
    }
    None
}

/// Decimal prefix of `digits` after leading whitespace, truncated to a byte.
/// Anything unparsable reads as zero.
fn leading_number(digits: &[u8]) -> u8 {
    digits
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .fold(0u8, |acc, d| acc.wrapping_mul(10).wrapping_add(d - b'0'))
}
