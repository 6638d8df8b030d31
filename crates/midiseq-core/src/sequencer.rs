//! The public sequencer: load a song, then drive it with `tick`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::config::SequencerConfig;
use crate::error::{Error, Result};
use crate::format::{CmfInstrument, FileFormat};
use crate::interface::MidiRtInterface;
use crate::playback::{internal_loop_count, Playback};
use crate::song::Song;
use crate::timeline::Marker;

const MIDI_CHANNELS: usize = 16;
/// Channels silenced before a multi-song switch.
const SONG_SWITCH_CHANNELS: u8 = 15;
const CC_SUSTAIN: u8 = 64;
const CC_SOFT_PEDAL: u8 = 66;
const CC_ALL_NOTES_OFF: u8 = 123;

/// MIDI-family sequencer driving a [`MidiRtInterface`].
///
/// ```ignore
/// let mut seq = Sequencer::builder(synth).loop_enabled(true).build()?;
/// seq.load_file("doom.mus")?;
/// loop {
///     let next = seq.tick(elapsed, 0.0001);
///     // sleep or render `next` seconds
/// }
/// ```
pub struct Sequencer<I: MidiRtInterface> {
    interface: I,
    config: SequencerConfig,
    song: Option<Song>,
    playback: Playback,
    error: String,
}

impl<I: MidiRtInterface> Sequencer<I> {
    /// Sequencer with the default configuration.
    pub fn new(interface: I) -> Self {
        let config = SequencerConfig::default();
        Self {
            interface,
            playback: Playback::new(&config),
            config,
            song: None,
            error: String::new(),
        }
    }

    pub fn builder(interface: I) -> SequencerBuilder<I> {
        SequencerBuilder::new(interface)
    }

    pub fn with_config(interface: I, config: SequencerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            interface,
            playback: Playback::new(&config),
            config,
            song: None,
            error: String::new(),
        })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    pub fn into_interface(self) -> I {
        self.interface
    }

    // ==================== Loading ====================

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let loaded = File::open(path)
            .map_err(Error::from)
            .and_then(|file| read_all(BufReader::new(file)));
        match loaded {
            Ok(data) => self.load_bytes(&data),
            Err(e) => {
                self.error = format!("{}: {e}", path.display());
                self.song = None;
                Err(e)
            }
        }
    }

    pub fn load_reader<R: Read>(&mut self, reader: R) -> Result<()> {
        match read_all(reader) {
            Ok(data) => self.load_bytes(&data),
            Err(e) => self.fail(e),
        }
    }

    /// Parses `data`. On failure the previous song is dropped and
    /// [`error_string`](Self::error_string) describes the problem.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<()> {
        match Song::load(data, self.config.song_number, self.config.post_song_wait) {
            Ok(song) => {
                self.error.clear();
                self.attach(song);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: Error) -> Result<()> {
        self.error = e.to_string();
        self.song = None;
        Err(e)
    }

    fn attach(&mut self, song: Song) {
        self.playback.attach(&song);
        self.song = Some(song);
    }

    /// Message of the last failed load, empty after a successful one.
    pub fn error_string(&self) -> &str {
        &self.error
    }

    pub fn is_loaded(&self) -> bool {
        self.song.is_some()
    }

    // ==================== Song info ====================

    /// Format family of the loaded song; [`FileFormat::Midi`] when empty.
    pub fn format(&self) -> FileFormat {
        self.song.as_ref().map(|s| s.format).unwrap_or_default()
    }

    /// SMF format number (0, 1 or 2) of the loaded song.
    pub fn smf_format(&self) -> u16 {
        self.song.as_ref().map_or(0, |s| s.smf_format)
    }

    pub fn track_count(&self) -> usize {
        self.song.as_ref().map_or(0, |s| s.tracks.len())
    }

    /// Ticks per quarter note.
    pub fn division(&self) -> u64 {
        self.song.as_ref().map_or(0, |s| s.division)
    }

    pub fn title(&self) -> &str {
        self.song.as_ref().map_or("", |s| s.title.as_str())
    }

    pub fn copyright(&self) -> &str {
        self.song.as_ref().map_or("", |s| s.copyright.as_str())
    }

    pub fn track_titles(&self) -> &[String] {
        self.song.as_ref().map(|s| s.track_titles.as_slice()).unwrap_or_default()
    }

    pub fn markers(&self) -> &[Marker] {
        self.song.as_ref().map(|s| s.markers.as_slice()).unwrap_or_default()
    }

    /// Raw instrument records of a CMF song.
    pub fn cmf_instruments(&self) -> &[CmfInstrument] {
        self.song.as_ref().map(|s| s.cmf_instruments.as_slice()).unwrap_or_default()
    }

    /// Song length in seconds, including the post-song wait.
    pub fn time_length(&self) -> f64 {
        self.song.as_ref().map_or(0.0, |s| s.length)
    }

    /// -1 when the song has no valid loop.
    pub fn loop_start_time(&self) -> f64 {
        self.song.as_ref().map_or(-1.0, |s| s.loop_start_time)
    }

    /// -1 when the song has no valid loop.
    pub fn loop_end_time(&self) -> f64 {
        self.song.as_ref().map_or(-1.0, |s| s.loop_end_time)
    }

    // ==================== Multi-song ====================

    /// Songs in the loaded container; 0 for single-song formats.
    pub fn songs_count(&self) -> usize {
        self.song.as_ref().map_or(0, |s| s.songs.len())
    }

    pub fn song_num(&self) -> usize {
        self.song.as_ref().map_or(0, |s| s.song_index)
    }

    /// Switches to song `index` of a multi-song container, clamped to the
    /// last song. Other formats only remember the number for the next load.
    pub fn set_song_num(&mut self, index: usize) -> Result<()> {
        self.config.song_number = index;
        let Some(song) = &self.song else {
            return Ok(());
        };
        if song.songs.is_empty() || song.format != FileFormat::Xmidi {
            return Ok(());
        }

        let index = index.min(song.songs.len() - 1);
        let songs = song.songs.clone();
        for channel in 0..SONG_SWITCH_CHANNELS {
            self.interface.controller_change(channel, CC_ALL_NOTES_OFF, 0);
        }
        debug!(index, songs = songs.len(), "Switching song");

        match Song::load_song(songs, index, self.config.post_song_wait) {
            Ok(song) => {
                self.attach(song);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    // ==================== Playback controls ====================

    pub fn loop_enabled(&self) -> bool {
        self.playback.loop_enabled
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.playback.loop_enabled = enabled;
    }

    /// External play count: -1 for forever, otherwise 1-based.
    pub fn loops_count(&self) -> i32 {
        let count = self.playback.loop_count;
        if count >= 0 {
            count + 1
        } else {
            count
        }
    }

    /// Takes effect at the next rewind.
    pub fn set_loops_count(&mut self, loops: i32) {
        self.playback.loop_count = internal_loop_count(loops);
    }

    pub fn loop_hooks_only(&self) -> bool {
        self.playback.loop_hooks_only
    }

    pub fn set_loop_hooks_only(&mut self, enabled: bool) {
        self.playback.loop_hooks_only = enabled;
    }

    pub fn tempo_multiplier(&self) -> f64 {
        self.playback.tempo_multiplier
    }

    pub fn set_tempo(&mut self, multiplier: f64) {
        self.playback.tempo_multiplier = multiplier;
    }

    /// Returns false when `track` does not exist.
    pub fn set_track_enabled(&mut self, track: usize, enabled: bool) -> bool {
        match self.playback.track_disabled.get_mut(track) {
            Some(disabled) => {
                *disabled = !enabled;
                true
            }
            None => false,
        }
    }

    /// Plays only `track`; `None` plays every enabled track.
    pub fn set_solo_track(&mut self, track: Option<usize>) {
        self.playback.solo = track;
    }

    /// Disabling a channel releases its pedals and every key on it.
    /// Returns false when `channel` is not a MIDI channel.
    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) -> bool {
        let Some(disabled) = self.playback.channel_disabled.get_mut(channel) else {
            return false;
        };
        if !enabled && !*disabled {
            let ch = channel as u8;
            self.interface.controller_change(ch, CC_SUSTAIN, 0);
            self.interface.controller_change(ch, CC_SOFT_PEDAL, 0);
            for note in 0..128u8 {
                self.interface.note_off(ch, note);
                self.interface.note_off_velocity(ch, note, 0);
            }
        }
        *disabled = !enabled;
        true
    }

    pub fn channel_enabled(&self, channel: usize) -> bool {
        channel < MIDI_CHANNELS && !self.playback.channel_disabled[channel]
    }

    // ==================== Transport ====================

    /// Advances playback by `seconds` and dispatches due events. Returns
    /// the seconds until the next call is due.
    pub fn tick(&mut self, seconds: f64, granularity: f64) -> f64 {
        let Some(song) = &self.song else {
            return 0.0;
        };
        self.playback
            .tick(song, &mut self.interface, seconds, granularity)
    }

    /// Moves to `seconds` without sounding skipped notes. Returns the
    /// seconds until the next event.
    pub fn seek(&mut self, seconds: f64, granularity: f64) -> f64 {
        let Some(song) = &self.song else {
            return 0.0;
        };
        self.playback
            .seek(song, &mut self.interface, seconds, granularity)
    }

    pub fn rewind(&mut self) {
        if let Some(song) = &self.song {
            self.playback.rewind(song);
        }
    }

    /// Renders PCM through [`MidiRtInterface::render_pcm`] while playing.
    /// Returns the bytes written, fewer than `buffer.len()` once the song
    /// has ended.
    pub fn play_stream(&mut self, buffer: &mut [u8]) -> usize {
        let Some(song) = &self.song else {
            return 0;
        };
        self.playback
            .play_stream(song, &mut self.interface, buffer)
    }

    /// Seconds since song begin.
    pub fn tell(&self) -> f64 {
        self.playback.position.abs_time
    }

    pub fn at_end(&self) -> bool {
        self.playback.at_end
    }
}

fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

/// Builds a [`Sequencer`] from an interface and a validated config.
pub struct SequencerBuilder<I: MidiRtInterface> {
    interface: I,
    config: SequencerConfig,
}

impl<I: MidiRtInterface> SequencerBuilder<I> {
    pub fn new(interface: I) -> Self {
        Self {
            interface,
            config: SequencerConfig::default(),
        }
    }

    pub fn config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    pub fn frame_size(mut self, bytes: usize) -> Self {
        self.config.frame_size = bytes;
        self
    }

    pub fn post_song_wait(mut self, seconds: f64) -> Self {
        self.config.post_song_wait = seconds;
        self
    }

    pub fn loop_enabled(mut self, enabled: bool) -> Self {
        self.config.loop_enabled = enabled;
        self
    }

    pub fn loop_count(mut self, loops: i32) -> Self {
        self.config.loop_count = loops;
        self
    }

    pub fn loop_hooks_only(mut self, enabled: bool) -> Self {
        self.config.loop_hooks_only = enabled;
        self
    }

    pub fn tempo_multiplier(mut self, multiplier: f64) -> Self {
        self.config.tempo_multiplier = multiplier;
        self
    }

    pub fn song_number(mut self, index: usize) -> Self {
        self.config.song_number = index;
        self
    }

    pub fn build(self) -> Result<Sequencer<I>> {
        Sequencer::with_config(self.interface, self.config)
    }
}
