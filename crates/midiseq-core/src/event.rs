//! Parsed event model.
//!
//! A [`MidiEvent`] is one channel message, system message or meta event
//! read from a track. Meta events also carry the sequencer's own markers
//! (loop points, raw OPL writes, callback triggers, the song-begin hook)
//! under the custom subtype range `0xE1..=0xE7` and `0x101`.

use smallvec::SmallVec;

/// Inline payload storage; channel messages and most metas fit without
/// allocating.
pub type EventData = SmallVec<[u8; 8]>;

/// Meta event subtypes, including the sequencer-private ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKind {
    SequenceNumber,
    Text,
    Copyright,
    TrackTitle,
    InstrumentTitle,
    Lyrics,
    Marker,
    CuePoint,
    DeviceSwitch,
    ChannelPrefix,
    EndOfTrack,
    TempoChange,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    /// Global loop start (text marker `loopstart`, CC110/CC111).
    LoopStart,
    /// Global loop end (text marker `loopend`, CC111 after CC110).
    LoopEnd,
    /// Direct OPL register write: `[register, value]`.
    RawOpl,
    /// Nested loop entry: `[repeat count]`, zero meaning forever.
    LoopStackBegin,
    LoopStackEnd,
    LoopStackBreak,
    /// Application callback: `[value]`.
    CallbackTrigger,
    /// Synthetic event placed at the very start of track 0.
    SongBegin,
    Other(u8),
}

impl MetaKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::SequenceNumber,
            0x01 => Self::Text,
            0x02 => Self::Copyright,
            0x03 => Self::TrackTitle,
            0x04 => Self::InstrumentTitle,
            0x05 => Self::Lyrics,
            0x06 => Self::Marker,
            0x07 => Self::CuePoint,
            0x09 => Self::DeviceSwitch,
            0x20 => Self::ChannelPrefix,
            0x2F => Self::EndOfTrack,
            0x51 => Self::TempoChange,
            0x54 => Self::SmpteOffset,
            0x58 => Self::TimeSignature,
            0x59 => Self::KeySignature,
            0x7F => Self::SequencerSpecific,
            0xE1 => Self::LoopStart,
            0xE2 => Self::LoopEnd,
            0xE3 => Self::RawOpl,
            0xE4 => Self::LoopStackBegin,
            0xE5 => Self::LoopStackEnd,
            0xE6 => Self::LoopStackBreak,
            0xE7 => Self::CallbackTrigger,
            other => Self::Other(other),
        }
    }

    /// Numeric subtype as reported to the raw event hooks.
    pub fn code(self) -> u16 {
        match self {
            Self::SequenceNumber => 0x00,
            Self::Text => 0x01,
            Self::Copyright => 0x02,
            Self::TrackTitle => 0x03,
            Self::InstrumentTitle => 0x04,
            Self::Lyrics => 0x05,
            Self::Marker => 0x06,
            Self::CuePoint => 0x07,
            Self::DeviceSwitch => 0x09,
            Self::ChannelPrefix => 0x20,
            Self::EndOfTrack => 0x2F,
            Self::TempoChange => 0x51,
            Self::SmpteOffset => 0x54,
            Self::TimeSignature => 0x58,
            Self::KeySignature => 0x59,
            Self::SequencerSpecific => 0x7F,
            Self::LoopStart => 0xE1,
            Self::LoopEnd => 0xE2,
            Self::RawOpl => 0xE3,
            Self::LoopStackBegin => 0xE4,
            Self::LoopStackEnd => 0xE5,
            Self::LoopStackBreak => 0xE6,
            Self::CallbackTrigger => 0xE7,
            Self::SongBegin => 0x101,
            Self::Other(code) => u16::from(code),
        }
    }

    /// Loop control events handled by the loop state machine.
    pub fn is_loop_control(self) -> bool {
        matches!(
            self,
            Self::LoopStart
                | Self::LoopEnd
                | Self::LoopStackBegin
                | Self::LoopStackEnd
                | Self::LoopStackBreak
        )
    }
}

/// Event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOff,
    NoteOn,
    NoteTouch,
    ControlChange,
    PatchChange,
    ChannelAftertouch,
    PitchBend,
    SysEx,
    SongPositionPointer,
    SongSelect,
    Meta(MetaKind),
    /// Any other system status byte; carries no data and is never dispatched.
    System(u8),
}

impl EventKind {
    /// Numeric type as reported to the raw event hook: the status nibble for
    /// channel messages, the status byte otherwise.
    pub fn code(self) -> u8 {
        match self {
            Self::NoteOff => 0x08,
            Self::NoteOn => 0x09,
            Self::NoteTouch => 0x0A,
            Self::ControlChange => 0x0B,
            Self::PatchChange => 0x0C,
            Self::ChannelAftertouch => 0x0D,
            Self::PitchBend => 0x0E,
            Self::SysEx => 0xF0,
            Self::SongPositionPointer => 0xF2,
            Self::SongSelect => 0xF3,
            Self::Meta(_) => 0xFF,
            Self::System(status) => status,
        }
    }

    #[inline]
    pub fn is_channel(self) -> bool {
        matches!(
            self,
            Self::NoteOff
                | Self::NoteOn
                | Self::NoteTouch
                | Self::ControlChange
                | Self::PatchChange
                | Self::ChannelAftertouch
                | Self::PitchBend
        )
    }

    #[inline]
    pub fn meta(self) -> Option<MetaKind> {
        match self {
            Self::Meta(kind) => Some(kind),
            _ => None,
        }
    }
}

/// One parsed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub kind: EventKind,
    /// Channel 0-15 for channel messages, 0 otherwise.
    pub channel: u8,
    /// Data bytes. SysEx payloads include their leading status byte.
    pub data: EventData,
}

impl MidiEvent {
    pub fn new(kind: EventKind, channel: u8, data: &[u8]) -> Self {
        Self {
            kind,
            channel,
            data: SmallVec::from_slice(data),
        }
    }

    pub fn meta(kind: MetaKind, data: &[u8]) -> Self {
        Self::new(EventKind::Meta(kind), 0, data)
    }

    pub fn end_of_track() -> Self {
        Self::meta(MetaKind::EndOfTrack, &[])
    }

    #[inline]
    pub fn is_meta(&self, kind: MetaKind) -> bool {
        self.kind == EventKind::Meta(kind)
    }

    #[inline]
    pub fn is_end_of_track(&self) -> bool {
        self.is_meta(MetaKind::EndOfTrack)
    }

    /// Data byte `index`, or zero when the payload is shorter.
    #[inline]
    pub fn byte(&self, index: usize) -> u8 {
        self.data.get(index).copied().unwrap_or(0)
    }
}
