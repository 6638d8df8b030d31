//! Playback and seek engine.
//!
//! All tracks advance in lock-step, measured in ticks: each step dispatches
//! the rows that are due, then consumes the shortest pending delay across
//! live tracks and converts only that delay into seconds of `wait`.

use tracing::{debug, trace, warn};

use crate::bytes::read_be;
use crate::config::SequencerConfig;
use crate::event::{EventKind, MetaKind, MidiEvent};
use crate::fraction::Fraction;
use crate::interface::MidiRtInterface;
use crate::loop_state::LoopState;
use crate::position::{CursorState, Position};
use crate::song::Song;

/// Row steps allowed per `tick` call while no time passes.
pub const ANTI_FREEZE_LIMIT: u32 = 10_000;

const MIDI_CHANNELS: usize = 16;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Sample clock of [`Playback::play_stream`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StreamTime {
    /// Seconds left before the next `tick`.
    pub rest: f64,
    pub sample_rate: u32,
    pub frame_size: usize,
    /// Granularity passed to `tick`, one sample.
    pub min_delay: f64,
    /// Delay returned by the last `tick`.
    pub delay: f64,
}

impl StreamTime {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        let mut time = Self {
            rest: 0.0,
            sample_rate,
            frame_size,
            min_delay: 0.0,
            delay: 0.0,
        };
        time.reset();
        time
    }

    pub fn reset(&mut self) {
        self.rest = 0.0;
        self.min_delay = 1.0 / f64::from(self.sample_rate);
        self.delay = 0.0;
    }
}

/// Mutable playback state over an immutable [`Song`].
#[derive(Debug, Clone)]
pub(crate) struct Playback {
    pub position: Position,
    /// Snapshot restored when the flat loop wraps. Captured from the row
    /// that raised the first loop start if the timeline did not set it.
    pub loop_begin: Position,
    pub loop_state: LoopState,
    pub at_end: bool,
    pub loop_enabled: bool,
    pub loop_hooks_only: bool,
    /// Internal 0-based loop count, negative for forever.
    pub loop_count: i32,
    pub tempo_multiplier: f64,
    pub post_song_wait: f64,
    pub track_disabled: Vec<bool>,
    pub solo: Option<usize>,
    pub channel_disabled: [bool; MIDI_CHANNELS],
    pub time: StreamTime,
}

/// Counts of loop signals raised while dispatching one step.
#[derive(Default)]
struct Caught {
    starts: u32,
    stack_starts: u32,
    stack_ends: u32,
    stack_end_time: f64,
    stack_breaks: u32,
}

/// Converts an external 1-based play count to the internal 0-based one.
pub(crate) fn internal_loop_count(loops: i32) -> i32 {
    if loops >= 1 {
        loops - 1
    } else {
        loops
    }
}

fn all_notes_off<I: MidiRtInterface + ?Sized>(iface: &mut I) {
    for channel in 0..MIDI_CHANNELS as u8 {
        iface.controller_change(channel, CC_ALL_NOTES_OFF, 0);
    }
}

impl Playback {
    pub fn new(config: &SequencerConfig) -> Self {
        Self {
            position: Position::default(),
            loop_begin: Position::default(),
            loop_state: LoopState::new(),
            at_end: false,
            loop_enabled: config.loop_enabled,
            loop_hooks_only: config.loop_hooks_only,
            loop_count: internal_loop_count(config.loop_count),
            tempo_multiplier: config.tempo_multiplier,
            post_song_wait: config.post_song_wait,
            track_disabled: Vec::new(),
            solo: None,
            channel_disabled: [false; MIDI_CHANNELS],
            time: StreamTime::new(config.sample_rate, config.frame_size),
        }
    }

    /// Prepares playback of a freshly loaded `song`.
    pub fn attach(&mut self, song: &Song) {
        self.loop_state.full_reset();
        self.loop_state.invalid = song.invalid_loop;
        self.loop_state.stack = song.loop_stack.clone();
        self.loop_begin = song.loop_begin.clone();
        self.track_disabled = vec![false; song.tracks.len()];
        self.solo = None;
        self.rewind(song);
    }

    pub fn rewind(&mut self, song: &Song) {
        self.position = song.track_begin.clone();
        self.at_end = false;
        self.loop_state.loops_count = self.loop_count;
        self.loop_state.reset();
        self.loop_state.stack_level = -1;
        self.loop_state.caught_start = true;
        self.loop_state.temporary_broken = false;
        self.time.reset();
    }

    /// Dispatches one step of due rows. Returns false once the song has
    /// ended and there is nothing left to do.
    pub fn process_events<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        seeking: bool,
    ) -> bool {
        if self.position.tracks.is_empty() {
            self.at_end = true;
        }
        if self.at_end {
            return false;
        }

        self.loop_state.caught_end = false;
        let row_begin = self.position.clone();
        let mut caught = Caught::default();
        let mut jump = false;

        for tk in 0..self.position.tracks.len() {
            let cursor = self.position.tracks[tk];
            if !cursor.is_live() || cursor.delay > 0 {
                continue;
            }
            let Some(row) = song.tracks[tk].get(cursor.row) else {
                self.position.tracks[tk].state = CursorState::Ended;
                continue;
            };

            for event in &row.events {
                if seeking && event.kind == EventKind::NoteOn {
                    continue;
                }
                self.handle_event(song, iface, tk, event);

                let ls = &mut self.loop_state;
                if ls.caught_start {
                    iface.loop_start();
                    caught.starts += 1;
                    ls.caught_start = false;
                }
                if ls.caught_stack_start {
                    if song.loop_start_time >= row.seconds() {
                        iface.loop_start();
                    }
                    caught.stack_starts += 1;
                    ls.caught_stack_start = false;
                }
                if ls.caught_stack_break {
                    caught.stack_breaks += 1;
                    ls.caught_stack_break = false;
                }
                if ls.caught_end || ls.is_stack_end() {
                    if ls.caught_stack_end {
                        ls.caught_stack_end = false;
                        caught.stack_ends += 1;
                        caught.stack_end_time = row.seconds();
                    }
                    jump = true;
                    break;
                }
                // A stack end on a level with no passes left is spent.
                ls.caught_stack_end = false;
            }

            let cursor = &mut self.position.tracks[tk];
            if cursor.is_live() {
                cursor.delay += row.delay;
                cursor.row += 1;
            }
            if jump {
                break;
            }
        }

        let shortest = self.position.shortest_delay();
        if let Some(ticks) = shortest {
            self.position.consume(ticks);
            self.position.wait += self.position.tempo.scale(ticks).to_f64();
        }

        if caught.starts > 0 && self.loop_begin.abs_time <= 0.0 {
            self.loop_begin = row_begin.clone();
        }

        if caught.stack_starts > 0 {
            for _ in 0..caught.stack_starts {
                self.loop_state.stack_up();
                self.loop_state.current_stack_mut().start_position = row_begin.clone();
            }
            return true;
        }

        for _ in 0..caught.stack_breaks {
            let entry = self.loop_state.current_stack_mut();
            entry.loops = 0;
            entry.infinite = false;
            self.loop_state.stack_down();
        }

        if caught.stack_ends > 0 {
            for _ in 0..caught.stack_ends {
                let entry = self.loop_state.current_stack_mut();
                if entry.infinite {
                    let restore = entry.start_position.clone();
                    let mut stop = false;
                    if song.loop_end_time >= caught.stack_end_time {
                        iface.loop_end();
                        stop = self.loop_hooks_only;
                    }
                    self.position = restore;
                    self.loop_state.skip_stack_start = true;
                    all_notes_off(iface);
                    if stop {
                        self.at_end = true;
                        self.position.wait += self.post_song_wait;
                    }
                    return true;
                }
                if entry.loops >= 0 {
                    entry.loops -= 1;
                    if entry.loops > 0 {
                        self.position = entry.start_position.clone();
                        self.loop_state.skip_stack_start = true;
                        all_notes_off(iface);
                        return true;
                    }
                }
                self.loop_state.stack_down();
            }
            return true;
        }

        if shortest.is_none() || self.loop_state.caught_end {
            iface.loop_end();
            all_notes_off(iface);
            self.loop_state.caught_end = false;

            let ls = &mut self.loop_state;
            if !self.loop_enabled
                || (shortest.is_none() && ls.loops_count >= 0 && ls.loops_left < 1)
                || self.loop_hooks_only
            {
                self.at_end = true;
                self.position.wait += self.post_song_wait;
                return true;
            }

            if ls.temporary_broken {
                self.position = song.track_begin.clone();
                ls.temporary_broken = false;
            } else if ls.loops_count < 0 || ls.loops_left >= 1 {
                self.position = self.loop_begin.clone();
                if ls.loops_count >= 1 {
                    ls.loops_left -= 1;
                }
            }
        }
        true
    }

    fn handle_event<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        track: usize,
        event: &MidiEvent,
    ) {
        // Track 0 timing of format 0/1 files plays regardless of solo/disable.
        let timing = track == 0
            && song.smf_format < 2
            && matches!(
                event.kind,
                EventKind::Meta(MetaKind::TempoChange | MetaKind::TimeSignature)
            );
        if !timing {
            if self.solo.is_some_and(|solo| solo != track) {
                return;
            }
            if self.track_disabled.get(track).copied().unwrap_or(false) {
                return;
            }
        }

        iface.on_event(event.kind, event.channel, &event.data);

        match event.kind {
            EventKind::SysEx => iface.system_exclusive(&event.data),
            EventKind::Meta(kind) => self.handle_meta(song, iface, track, kind, event),
            EventKind::SongSelect | EventKind::SongPositionPointer | EventKind::System(_) => {}
            kind => self.handle_channel(iface, track, kind, event),
        }
    }

    fn handle_meta<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        track: usize,
        kind: MetaKind,
        event: &MidiEvent,
    ) {
        iface.meta_event(kind, &event.data);

        match kind {
            MetaKind::EndOfTrack => self.position.tracks[track].state = CursorState::Ended,
            MetaKind::TempoChange => {
                self.position.tempo = song.inv_division * Fraction::from_int(read_be(&event.data));
            }
            MetaKind::DeviceSwitch => {
                debug!(
                    track,
                    device = %String::from_utf8_lossy(&event.data),
                    "Switching another device"
                );
                iface.device_switch(track, &event.data);
            }
            kind if kind.is_loop_control() => {
                if self.loop_enabled && !self.loop_state.invalid {
                    self.catch_loop_signal(kind, event);
                }
            }
            MetaKind::CallbackTrigger => iface.callback_trigger(event.byte(0), track),
            MetaKind::RawOpl => iface.raw_opl(event.byte(0), event.byte(1)),
            MetaKind::SongBegin => iface.song_start(),
            _ => {}
        }
    }

    fn catch_loop_signal(&mut self, kind: MetaKind, event: &MidiEvent) {
        let ls = &mut self.loop_state;
        match kind {
            MetaKind::LoopStart => ls.caught_start = true,
            MetaKind::LoopEnd => ls.caught_end = true,
            MetaKind::LoopStackBegin => {
                if ls.skip_stack_start {
                    ls.skip_stack_start = false;
                    return;
                }
                let loops = event.byte(0);
                let level = usize::try_from(ls.stack_level + 1).unwrap_or(0);
                let entry = ls.stack_entry_mut(level);
                entry.loops = i32::from(loops);
                entry.infinite = loops == 0;
                trace!(level, loops, "Loop stack begin");
                ls.caught_stack_start = true;
            }
            MetaKind::LoopStackEnd => ls.caught_stack_end = true,
            MetaKind::LoopStackBreak => ls.caught_stack_break = true,
            _ => {}
        }
    }

    fn handle_channel<I: MidiRtInterface + ?Sized>(
        &mut self,
        iface: &mut I,
        track: usize,
        kind: EventKind,
        event: &MidiEvent,
    ) {
        let channel = usize::from(event.channel) + iface.current_device(track);
        self.position.tracks[track].state = CursorState::Handled(kind);
        let muted = channel < MIDI_CHANNELS && self.channel_disabled[channel];
        // Device offsets can push the channel past one port; backends see
        // the low byte, like a 7-bit port index plus channel nibble.
        let ch = channel as u8;
        let (a, b) = (event.byte(0), event.byte(1));

        match kind {
            EventKind::NoteOff if !muted => {
                iface.note_off(ch, a);
                iface.note_off_velocity(ch, a, b);
            }
            EventKind::NoteOn if !muted => iface.note_on(ch, a, b),
            EventKind::NoteTouch => iface.note_aftertouch(ch, a, b),
            EventKind::ControlChange => iface.controller_change(ch, a, b),
            EventKind::PatchChange => iface.patch_change(ch, a),
            EventKind::ChannelAftertouch => iface.channel_aftertouch(ch, a),
            EventKind::PitchBend => iface.pitch_bend(ch, b, a),
            _ => {}
        }
    }

    /// Advances by `seconds` of wall time and dispatches everything due
    /// within half of `granularity`. Returns seconds until the next call.
    pub fn tick<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        seconds: f64,
        granularity: f64,
    ) -> f64 {
        let s = seconds * self.tempo_multiplier;
        self.position.wait -= s;
        self.position.abs_time += s;

        let mut anti_freeze = ANTI_FREEZE_LIMIT;
        while self.position.wait <= granularity * 0.5 && anti_freeze > 0 {
            if !self.process_events(song, iface, false) {
                break;
            }
            if self.position.wait <= 0.0 {
                anti_freeze -= 1;
            }
        }
        if anti_freeze == 0 {
            warn!(
                limit = ANTI_FREEZE_LIMIT,
                "Too many zero-delay events, delaying playback by one second"
            );
            self.position.wait += 1.0;
        }

        self.position.wait.max(0.0)
    }

    /// Replays the song from the start with note-ons muted until `seconds`.
    pub fn seek<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        seconds: f64,
        granularity: f64,
    ) -> f64 {
        if seconds < 0.0 {
            return 0.0;
        }
        if seconds > song.length {
            self.rewind(song);
            return 0.0;
        }

        let loop_enabled = self.loop_enabled;
        self.loop_enabled = false;
        self.rewind(song);
        // Keep the loop begin snapshot from being moved to the seek target.
        self.loop_state.caught_start = false;
        self.loop_state.temporary_broken = seconds >= song.loop_end_time;

        let half = granularity * 0.5;
        while self.position.abs_time < seconds && self.position.abs_time < song.length {
            self.position.wait -= seconds;
            self.position.abs_time += seconds;

            let mut anti_freeze = ANTI_FREEZE_LIMIT;
            let mut target_wait = self.position.wait + half;
            while self.position.wait <= half && anti_freeze > 0 {
                if !self.process_events(song, iface, true) {
                    break;
                }
                if self.position.wait <= target_wait {
                    anti_freeze -= 1;
                } else {
                    target_wait = self.position.wait + half;
                    anti_freeze = ANTI_FREEZE_LIMIT;
                }
            }
            if anti_freeze == 0 {
                warn!(
                    limit = ANTI_FREEZE_LIMIT,
                    "Too many zero-delay events while seeking"
                );
                self.position.wait += 1.0;
            }
        }

        if self.position.wait < 0.0 {
            self.position.wait = 0.0;
        }

        if self.at_end {
            self.rewind(song);
            self.loop_enabled = loop_enabled;
            return 0.0;
        }

        self.time.reset();
        self.time.delay = self.position.wait;
        self.loop_enabled = loop_enabled;
        self.position.wait
    }

    /// Fills `buffer` with rendered PCM, ticking the song at sample
    /// accuracy. Returns the number of bytes written.
    pub fn play_stream<I: MidiRtInterface + ?Sized>(
        &mut self,
        song: &Song,
        iface: &mut I,
        buffer: &mut [u8],
    ) -> usize {
        let frame_size = self.time.frame_size;
        let rate = f64::from(self.time.sample_rate);
        let mut left = buffer.len() / frame_size;
        let mut written = 0;

        while left > 0 {
            let left_delay = left as f64 / rate;
            let max_delay = self.time.rest.min(left_delay);
            if self.at_end && self.time.delay <= 0.0 {
                break;
            }

            self.time.rest -= max_delay;
            let frames = ((rate * max_delay) as usize).min(left);
            if frames > 0 {
                let bytes = frames * frame_size;
                iface.render_pcm(&mut buffer[written..written + bytes]);
                written += bytes;
                left -= frames;
            }

            if self.time.rest <= 0.0 {
                self.time.delay = self.tick(song, iface, self.time.delay, self.time.min_delay);
                self.time.rest += self.time.delay;
            }
        }
        written
    }
}
