//! Real-time interface between the sequencer and a synthesizer backend.

use crate::event::{EventKind, MetaKind};

/// Receives events as the sequencer dispatches them.
///
/// The channel-voice methods and [`system_exclusive`](Self::system_exclusive)
/// are required. Everything else defaults to a no-op, so a backend only
/// overrides the hooks it cares about.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl MidiRtInterface for Printer {
///     fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
///         println!("on  {channel} {note} {velocity}");
///     }
///     fn note_off(&mut self, channel: u8, note: u8) {
///         println!("off {channel} {note}");
///     }
///     // ...
/// }
/// ```
pub trait MidiRtInterface {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);

    /// Note-off with its release velocity. Called right after
    /// [`note_off`](Self::note_off) for every note-off event.
    fn note_off_velocity(&mut self, _channel: u8, _note: u8, _velocity: u8) {}

    fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8);

    fn channel_aftertouch(&mut self, channel: u8, pressure: u8);

    fn controller_change(&mut self, channel: u8, controller: u8, value: u8);

    fn patch_change(&mut self, channel: u8, patch: u8);

    /// Pitch wheel, split into its 7-bit halves.
    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8);

    /// Raw system-exclusive message, starting with its status byte.
    fn system_exclusive(&mut self, data: &[u8]);

    /// Sees every dispatched event before it is routed.
    fn on_event(&mut self, _kind: EventKind, _channel: u8, _data: &[u8]) {}

    /// Sees every dispatched meta event.
    fn meta_event(&mut self, _kind: MetaKind, _data: &[u8]) {}

    /// A device-name meta event on `track`.
    fn device_switch(&mut self, _track: usize, _name: &[u8]) {}

    /// Channel offset of the device currently selected for `track`.
    fn current_device(&mut self, _track: usize) -> usize {
        0
    }

    /// Direct OPL register write (IMF playback).
    fn raw_opl(&mut self, _register: u8, _value: u8) {}

    /// XMI callback trigger (controller 119).
    fn callback_trigger(&mut self, _value: u8, _track: usize) {}

    fn loop_start(&mut self) {}

    fn loop_end(&mut self) {}

    /// Playback passed the beginning of the song.
    fn song_start(&mut self) {}

    /// Renders PCM into `buffer` for [`Sequencer::play_stream`].
    ///
    /// [`Sequencer::play_stream`]: crate::Sequencer::play_stream
    fn render_pcm(&mut self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

impl<T: MidiRtInterface + ?Sized> MidiRtInterface for Box<T> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_on(channel, note, velocity);
    }
    fn note_off(&mut self, channel: u8, note: u8) {
        (**self).note_off(channel, note);
    }
    fn note_off_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_off_velocity(channel, note, velocity);
    }
    fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8) {
        (**self).note_aftertouch(channel, note, pressure);
    }
    fn channel_aftertouch(&mut self, channel: u8, pressure: u8) {
        (**self).channel_aftertouch(channel, pressure);
    }
    fn controller_change(&mut self, channel: u8, controller: u8, value: u8) {
        (**self).controller_change(channel, controller, value);
    }
    fn patch_change(&mut self, channel: u8, patch: u8) {
        (**self).patch_change(channel, patch);
    }
    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8) {
        (**self).pitch_bend(channel, msb, lsb);
    }
    fn system_exclusive(&mut self, data: &[u8]) {
        (**self).system_exclusive(data);
    }
    fn on_event(&mut self, kind: EventKind, channel: u8, data: &[u8]) {
        (**self).on_event(kind, channel, data);
    }
    fn meta_event(&mut self, kind: MetaKind, data: &[u8]) {
        (**self).meta_event(kind, data);
    }
    fn device_switch(&mut self, track: usize, name: &[u8]) {
        (**self).device_switch(track, name);
    }
    fn current_device(&mut self, track: usize) -> usize {
        (**self).current_device(track)
    }
    fn raw_opl(&mut self, register: u8, value: u8) {
        (**self).raw_opl(register, value);
    }
    fn callback_trigger(&mut self, value: u8, track: usize) {
        (**self).callback_trigger(value, track);
    }
    fn loop_start(&mut self) {
        (**self).loop_start();
    }
    fn loop_end(&mut self) {
        (**self).loop_end();
    }
    fn song_start(&mut self) {
        (**self).song_start();
    }
    fn render_pcm(&mut self, buffer: &mut [u8]) {
        (**self).render_pcm(buffer);
    }
}

/// Interface that drops every event. Useful for scanning a song.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInterface;

impl MidiRtInterface for NullInterface {
    fn note_on(&mut self, _channel: u8, _note: u8, _velocity: u8) {}
    fn note_off(&mut self, _channel: u8, _note: u8) {}
    fn note_aftertouch(&mut self, _channel: u8, _note: u8, _pressure: u8) {}
    fn channel_aftertouch(&mut self, _channel: u8, _pressure: u8) {}
    fn controller_change(&mut self, _channel: u8, _controller: u8, _value: u8) {}
    fn patch_change(&mut self, _channel: u8, _patch: u8) {}
    fn pitch_bend(&mut self, _channel: u8, _msb: u8, _lsb: u8) {}
    fn system_exclusive(&mut self, _data: &[u8]) {}
}
