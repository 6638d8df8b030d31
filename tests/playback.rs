//! End-to-end playback through `Sequencer::tick`, `seek` and `play_stream`.

mod helpers;

use approx::assert_relative_eq;
use helpers::tolerances::TIME_EPSILON;
use helpers::*;
use midiseq::{Sequencer, ANTI_FREEZE_LIMIT};
use proptest::prelude::*;

fn loaded(data: &[u8]) -> Sequencer<Recorder> {
    init_tracing();
    let mut seq = Sequencer::new(Recorder::default());
    seq.load_bytes(data).unwrap();
    seq
}

fn loaded_looping(data: &[u8], loops: i32) -> Sequencer<Recorder> {
    init_tracing();
    let mut seq = Sequencer::builder(Recorder::default())
        .loop_enabled(true)
        .loop_count(loops)
        .build()
        .unwrap();
    seq.load_bytes(data).unwrap();
    seq
}

fn played(seq: &Sequencer<Recorder>) -> Vec<u8> {
    seq.interface().note_ons()
}

// =============================================================================
// Straight playback
// =============================================================================

#[test]
fn test_plays_every_note_then_stops() {
    let mut seq = loaded(&four_notes());
    assert_relative_eq!(seq.time_length(), 3.0, epsilon = TIME_EPSILON);

    let steps = play_to_end(&mut seq, 0.01, 1000);
    assert!(steps < 1000, "song never ended");
    assert!(seq.at_end());
    assert_eq!(played(&seq), vec![60, 62, 64, 65]);
    assert_eq!(seq.interface().count(&Call::SongStart), 1);
}

#[test]
fn test_row_dispatch_order() {
    let data = smf(
        vec![vec![
            note_on(0, 0, 62, 90),
            controller(0, 0, 7, 100),
            note_off(0, 0, 61),
            note_on(0, 0, 64, 80),
            note_off(0, 0, 64),
        ]],
        480,
    );
    let mut seq = loaded(&data);
    seq.tick(0.0, 0.001);

    let channel_calls: Vec<Call> = seq
        .interface()
        .calls
        .iter()
        .filter(|c| {
            matches!(
                c,
                Call::NoteOn { .. } | Call::NoteOff { .. } | Call::Controller { .. }
            )
        })
        .cloned()
        .collect();
    assert_eq!(
        channel_calls,
        vec![
            Call::NoteOff { channel: 0, note: 61 },
            Call::Controller { channel: 0, controller: 7, value: 100 },
            Call::NoteOn { channel: 0, note: 62, velocity: 90 },
            // Zero-length note: released after it starts.
            Call::NoteOn { channel: 0, note: 64, velocity: 80 },
            Call::NoteOff { channel: 0, note: 64 },
        ]
    );
}

#[test]
fn test_restruck_sounding_note_is_released_first() {
    // Note 60 is still sounding when a note-on and note-off for it share a row.
    let data = smf(
        vec![vec![
            note_on(0, 0, 60, 100),
            note_on(480, 0, 60, 90),
            note_off(480, 0, 60),
            note_off(960, 0, 60),
        ]],
        960,
    );
    let mut seq = loaded(&data);
    play_to_end(&mut seq, 0.01, 1000);

    let notes: Vec<Call> = seq
        .interface()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::NoteOn { .. } | Call::NoteOff { .. }))
        .cloned()
        .collect();
    assert_eq!(
        notes,
        vec![
            Call::NoteOn { channel: 0, note: 60, velocity: 100 },
            Call::NoteOff { channel: 0, note: 60 },
            Call::NoteOn { channel: 0, note: 60, velocity: 90 },
            Call::NoteOff { channel: 0, note: 60 },
        ]
    );
}

#[test]
fn test_tempo_multiplier_speeds_up_playback() {
    let mut normal = loaded(&four_notes());
    let normal_steps = play_to_end(&mut normal, 0.01, 1000);

    let mut fast = loaded(&four_notes());
    fast.set_tempo(2.0);
    let fast_steps = play_to_end(&mut fast, 0.01, 1000);

    assert!((195..=205).contains(&normal_steps), "{normal_steps}");
    assert!((95..=105).contains(&fast_steps), "{fast_steps}");
    assert_eq!(played(&fast), vec![60, 62, 64, 65]);
}

#[test]
fn test_rewind_replays_identically() {
    let mut seq = loaded(&looped_four_notes());
    play_to_end(&mut seq, 0.01, 1000);
    let first = seq.interface().calls.clone();

    seq.rewind();
    assert!(!seq.at_end());
    assert_eq!(seq.tell(), 0.0);
    seq.interface_mut().clear();
    play_to_end(&mut seq, 0.01, 1000);

    assert_eq!(seq.interface().calls, first);
}

// =============================================================================
// Loops
// =============================================================================

#[test]
fn test_loop_wraps_between_markers() {
    let mut seq = loaded_looping(&looped_four_notes(), -1);
    assert_relative_eq!(seq.loop_start_time(), 0.5, epsilon = TIME_EPSILON);
    assert_relative_eq!(seq.loop_end_time(), 1.5, epsilon = TIME_EPSILON);

    for _ in 0..600 {
        seq.tick(0.01, 0.001);
        assert!(!seq.at_end());
        assert!(seq.tell() <= 1.5 + 0.011, "tell {} past loop end", seq.tell());
    }
    assert!(seq.interface().count(&Call::LoopEnd) >= 4);
    // The note before the loop start plays once.
    assert_eq!(played(&seq).iter().filter(|&&n| n == 60).count(), 1);
}

#[test]
fn test_loop_count_limits_passes() {
    let mut seq = loaded_looping(&looped_four_notes(), 2);
    assert_eq!(seq.loops_count(), 2);

    let steps = play_to_end(&mut seq, 0.01, 2000);
    assert!(steps < 2000, "song never ended");
    let notes = played(&seq);
    assert_eq!(notes.iter().filter(|&&n| n == 62).count(), 2);
    assert_eq!(notes.iter().filter(|&&n| n == 60).count(), 1);
}

#[test]
fn test_hooks_only_stops_at_loop_end() {
    let mut seq = loaded_looping(&looped_four_notes(), -1);
    seq.set_loop_hooks_only(true);

    play_to_end(&mut seq, 0.01, 1000);
    assert!(seq.at_end());
    assert_eq!(played(&seq), vec![60, 62, 64]);
    assert!(seq.interface().count(&Call::LoopEnd) >= 1);
}

#[test]
fn test_reversed_markers_play_like_unmarked_song() {
    let reversed = smf(
        vec![vec![
            note_on(0, 0, 60, 100),
            note_off(480, 0, 60),
            marker(480, b"loopEnd"),
            note_on(480, 0, 62, 100),
            note_off(960, 0, 62),
            note_on(960, 0, 64, 100),
            note_off(1440, 0, 64),
            marker(1440, b"loopStart"),
            note_on(1440, 0, 65, 100),
            note_off(1920, 0, 65),
        ]],
        1920,
    );

    let mut marked = loaded_looping(&reversed, 1);
    assert_eq!(marked.loop_start_time(), -1.0);
    play_to_end(&mut marked, 0.01, 1000);

    let mut plain = loaded_looping(&four_notes(), 1);
    play_to_end(&mut plain, 0.01, 1000);

    assert!(marked.at_end());
    assert_eq!(played(&marked), vec![60, 62, 64, 65]);
    assert_eq!(played(&marked), played(&plain));
}

#[test]
fn test_zero_time_loop_trips_anti_freeze() {
    // A tempo of zero makes the loop body take no time at all.
    let data = smf(
        vec![vec![tempo(0, 0), marker(0, b"loopStart"), marker(1, b"loopEnd")]],
        2,
    );
    let mut seq = loaded_looping(&data, -1);

    let wait = seq.tick(0.0, 0.001);
    assert_relative_eq!(wait, 1.0, epsilon = TIME_EPSILON);
    let wraps = seq.interface().count(&Call::LoopEnd);
    assert!(wraps > 0 && wraps <= ANTI_FREEZE_LIMIT as usize);
}

// =============================================================================
// Loop stack
// =============================================================================

fn count(notes: &[u8], key: u8) -> usize {
    notes.iter().filter(|&&n| n == key).count()
}

/// Note 60 inside a `loopstart=<n>` body, note 62 after it.
fn stacked_song(begin: &'static [u8]) -> Vec<u8> {
    smf(
        vec![vec![
            marker(0, begin),
            note_on(0, 0, 60, 100),
            note_off(240, 0, 60),
            marker(480, b"loopend="),
            note_on(600, 0, 62, 100),
            note_off(840, 0, 62),
        ]],
        960,
    )
}

#[test]
fn test_stack_loop_plays_body_count_times() {
    let mut seq = loaded_looping(&stacked_song(b"loopstart=3"), 1);
    let steps = play_to_end(&mut seq, 0.01, 2000);
    assert!(steps < 2000, "song never ended");
    assert_eq!(played(&seq), vec![60, 60, 60, 62]);
}

#[test]
fn test_stack_loop_is_ignored_without_looping() {
    let mut seq = loaded(&stacked_song(b"loopstart=3"));
    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![60, 62]);
}

#[test]
fn test_infinite_stack_loop_never_leaves_body() {
    let mut seq = loaded_looping(&stacked_song(b"loopstart=0"), 1);
    for _ in 0..600 {
        seq.tick(0.01, 0.001);
        assert!(!seq.at_end());
    }
    let notes = played(&seq);
    assert!(count(&notes, 60) >= 5, "{notes:?}");
    assert_eq!(count(&notes, 62), 0);
    assert!(seq.interface().count(&Call::LoopEnd) >= 5);
}

#[test]
fn test_hooks_only_stops_at_infinite_stack_end() {
    let mut seq = loaded_looping(&stacked_song(b"loopstart=0"), -1);
    seq.set_loop_hooks_only(true);

    let steps = play_to_end(&mut seq, 0.01, 1000);
    assert!(steps < 1000, "song never ended");
    assert_eq!(played(&seq), vec![60]);
    assert_eq!(seq.interface().count(&Call::LoopEnd), 1);
}

#[test]
fn test_nested_stack_loops() {
    // Outer body: 60, inner loop of 62, 64. Then 65 once.
    let data = smf(
        vec![vec![
            marker(0, b"loopstart=2"),
            note_on(0, 0, 60, 100),
            note_off(240, 0, 60),
            marker(480, b"loopstart=3"),
            note_on(480, 0, 62, 100),
            note_off(720, 0, 62),
            marker(960, b"loopend="),
            note_on(1200, 0, 64, 100),
            note_off(1440, 0, 64),
            marker(1680, b"loopend="),
            note_on(1800, 0, 65, 100),
            note_off(1900, 0, 65),
        ]],
        1920,
    );
    let mut seq = loaded_looping(&data, 1);
    let steps = play_to_end(&mut seq, 0.01, 4000);
    assert!(steps < 4000, "song never ended");

    // Leaving the inner loop returns to the outer level, whose second pass
    // starts the inner loop over with a fresh count.
    let notes = played(&seq);
    assert_eq!(count(&notes, 60), 2);
    assert_eq!(count(&notes, 62), 6);
    assert_eq!(count(&notes, 64), 2);
    assert_eq!(count(&notes, 65), 1);
    assert_eq!(notes.last(), Some(&65));
}

// =============================================================================
// Seeking
// =============================================================================

#[test]
fn test_seek_mutes_skipped_notes() {
    let mut seq = loaded(&four_notes());
    let wait = seq.seek(1.0, 0.0001);

    assert_relative_eq!(wait, 0.5, epsilon = TIME_EPSILON);
    assert_eq!(seq.tell(), 1.0);
    assert!(played(&seq).is_empty());

    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![65]);
}

#[test]
fn test_seek_out_of_range_rewinds() {
    let mut seq = loaded(&four_notes());
    seq.tick(1.2, 0.001);

    assert_eq!(seq.seek(10.0, 0.001), 0.0);
    assert_eq!(seq.tell(), 0.0);
    assert!(!seq.at_end());

    assert_eq!(seq.seek(-1.0, 0.001), 0.0);
}

#[test]
fn test_seek_then_song_end_keeps_looping() {
    let mut seq = loaded_looping(&four_notes(), -1);
    seq.seek(0.1, 0.001);

    for _ in 0..800 {
        seq.tick(0.01, 0.001);
        assert!(!seq.at_end(), "stopped at {}", seq.tell());
    }
    // The seek muted the first note; every wrap plays it again.
    assert!(count(&played(&seq), 60) >= 2, "{:?}", played(&seq));
}

#[test]
fn test_seek_then_marker_loop_keeps_looping() {
    let mut seq = loaded_looping(&looped_four_notes(), -1);
    seq.seek(0.1, 0.001);

    for _ in 0..600 {
        seq.tick(0.01, 0.001);
        assert!(!seq.at_end());
        assert!(seq.tell() <= 1.5 + 0.011, "tell {} past loop end", seq.tell());
    }
    assert!(count(&played(&seq), 62) >= 4);
}

#[test]
fn test_seek_past_loop_end_restarts_song_once() {
    let mut seq = loaded_looping(&looped_four_notes(), -1);
    seq.seek(1.6, 0.001);

    for _ in 0..600 {
        seq.tick(0.01, 0.001);
        assert!(!seq.at_end());
    }
    // The song end after the seek goes back to the very start, then the
    // marker loop takes over.
    let notes = played(&seq);
    assert_eq!(count(&notes, 60), 1);
    assert_eq!(count(&notes, 65), 0);
    assert!(count(&notes, 62) >= 3);
}

proptest! {
    #[test]
    fn seek_then_tell_matches(target in 0.0f64..1.9) {
        let mut seq = loaded(&four_notes());
        let wait = seq.seek(target, 0.0001);
        prop_assert_eq!(seq.tell(), target);
        // One row past the target may be dispatched within half the granularity.
        prop_assert!((0.0..=0.5 + 0.0001).contains(&wait));
        prop_assert!(!seq.at_end());
    }
}

// =============================================================================
// Track and channel controls
// =============================================================================

fn two_voice_song() -> Vec<u8> {
    smf(
        vec![
            vec![tempo(0, 500_000)],
            vec![note_on(0, 0, 60, 100), note_off(480, 0, 60)],
            vec![note_on(0, 1, 70, 100), note_off(480, 1, 70)],
        ],
        480,
    )
}

#[test]
fn test_disabled_track_is_silent() {
    let mut seq = loaded(&two_voice_song());
    assert_eq!(seq.track_count(), 3);
    assert!(seq.set_track_enabled(1, false));
    assert!(!seq.set_track_enabled(3, false));

    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![70]);
}

#[test]
fn test_solo_track() {
    let mut seq = loaded(&two_voice_song());
    seq.set_solo_track(Some(2));
    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![70]);

    seq.rewind();
    seq.interface_mut().clear();
    seq.set_solo_track(None);
    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![60, 70]);
}

#[test]
fn test_disabling_channel_releases_it() {
    let mut seq = loaded(&two_voice_song());
    assert!(seq.set_channel_enabled(0, false));
    assert!(!seq.channel_enabled(0));

    let iface = seq.interface();
    assert_eq!(
        iface.count(&Call::Controller { channel: 0, controller: 64, value: 0 }),
        1
    );
    assert_eq!(
        iface.count(&Call::Controller { channel: 0, controller: 66, value: 0 }),
        1
    );
    let releases = iface
        .calls
        .iter()
        .filter(|c| matches!(c, Call::NoteOff { channel: 0, .. }))
        .count();
    assert_eq!(releases, 128);

    // Already disabled: no second sweep.
    seq.interface_mut().clear();
    assert!(seq.set_channel_enabled(0, false));
    assert!(seq.interface().calls.is_empty());
    assert!(!seq.set_channel_enabled(16, false));

    play_to_end(&mut seq, 0.01, 1000);
    assert_eq!(played(&seq), vec![70]);
}

// =============================================================================
// Streaming
// =============================================================================

#[test]
fn test_play_stream_renders_song_and_tail() {
    init_tracing();
    let mut seq = Sequencer::builder(Recorder::default())
        .sample_rate(8000)
        .frame_size(4)
        .build()
        .unwrap();
    seq.load_bytes(&four_notes()).unwrap();

    let mut buffer = vec![0xAAu8; 200_000];
    let written = seq.play_stream(&mut buffer);

    // Two seconds of music plus one second of tail at 8 kHz, 4-byte frames.
    assert!((95_500..=96_100).contains(&written), "{written}");
    assert_eq!(written % 4, 0);
    assert!(buffer[..written].iter().all(|&b| b == 0));
    assert!(buffer[written..].iter().all(|&b| b == 0xAA));
    assert_eq!(played(&seq), vec![60, 62, 64, 65]);
    assert_eq!(seq.play_stream(&mut buffer), 0);
}

#[test]
fn test_unloaded_sequencer_is_inert() {
    let mut seq = Sequencer::new(Recorder::default());
    assert!(!seq.is_loaded());
    assert_eq!(seq.tick(1.0, 0.001), 0.0);
    assert_eq!(seq.seek(1.0, 0.001), 0.0);
    assert_eq!(seq.play_stream(&mut [0u8; 64]), 0);
    assert_eq!(seq.time_length(), 0.0);
    assert!(seq.interface().calls.is_empty());
}
