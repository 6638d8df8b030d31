//! Tempo maps and song metadata computed at load time.

mod helpers;

use approx::assert_relative_eq;
use helpers::tolerances::TIME_EPSILON;
use helpers::*;
use midiseq::core::parser::ParserContext;
use midiseq::core::timeline::build_timeline;
use midiseq::core::track::build_track_data;
use midiseq::{FileFormat, Fraction, Sequencer};

/// Track 0 switches from 500000 to 666667 us per quarter at beat 2;
/// track 1 holds notes across the change.
fn tempo_change_song() -> Vec<u8> {
    smf(
        vec![
            vec![tempo(960, 666_667)],
            vec![
                note_on(0, 0, 60, 100),
                note_off(960, 0, 60),
                note_on(960, 0, 62, 100),
                note_off(1920, 0, 62),
            ],
        ],
        1920,
    )
}

#[test]
fn test_tempo_change_times_are_exact() {
    init_tracing();
    let raw = raw_tracks(&tempo_change_song());
    assert_eq!(raw.len(), 2);

    let inv_division = Fraction::new(1, 480_000_000);
    let mut ctx = ParserContext::new(FileFormat::Midi);
    let mut data = build_track_data(&raw, true, inv_division, &mut ctx).unwrap();
    let timeline = build_timeline(&mut data, Fraction::new(500_000, 480_000_000), inv_division, 0.0);

    // 960 ticks at 0.5 s per quarter, then 960 ticks at 0.666667 s per quarter.
    let expected = Fraction::from_int(1) + Fraction::new(2 * 666_667, 1_000_000);
    assert_eq!(expected, Fraction::new(1_166_667, 500_000));
    for track in &data.tracks {
        let end = track.last().unwrap();
        assert_eq!(end.abs_tick, 1920);
        assert_eq!(end.time, expected);
    }
    assert_relative_eq!(timeline.length, 2.333334, epsilon = TIME_EPSILON);

    // Times never decrease along a track.
    for track in &data.tracks {
        assert!(track.windows(2).all(|w| w[0].time <= w[1].time));
    }
}

#[test]
fn test_sequencer_reports_length_and_metadata() {
    init_tracing();
    let data = smf(
        vec![
            vec![
                At {
                    tick: 0,
                    kind: midly::TrackEventKind::Meta(midly::MetaMessage::TrackName(b"Overture")),
                },
                At {
                    tick: 0,
                    kind: midly::TrackEventKind::Meta(midly::MetaMessage::Copyright(b"(c) 1994")),
                },
                marker(480, b"verse"),
                tempo(960, 666_667),
            ],
            vec![note_on(0, 0, 60, 100), note_off(1920, 0, 60)],
        ],
        1920,
    );
    let mut seq = Sequencer::new(Recorder::default());
    seq.load_bytes(&data).unwrap();

    assert_eq!(seq.format(), FileFormat::Midi);
    assert_eq!(seq.smf_format(), 1);
    assert_eq!(seq.division(), 480);
    assert_eq!(seq.track_count(), 2);
    assert_eq!(seq.title(), "Overture");
    assert_eq!(seq.copyright(), "(c) 1994");

    let markers = seq.markers();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].label, "verse");
    assert_eq!(markers[0].tick, 480);
    assert_relative_eq!(markers[0].time, 0.5, epsilon = TIME_EPSILON);

    // Default one second of post-song wait.
    assert_relative_eq!(seq.time_length(), 3.333334, epsilon = TIME_EPSILON);
}

#[test]
fn test_playback_follows_tempo_change() {
    let mut seq = Sequencer::new(Recorder::default());
    seq.load_bytes(&tempo_change_song()).unwrap();

    // Up to the change: one second.
    seq.tick(0.0, 0.0001);
    let wait = seq.tick(0.5, 0.0001);
    assert_relative_eq!(wait, 0.5, epsilon = 1e-6);
    let wait = seq.tick(0.5, 0.0001);
    // Second note now lasts 1.333334 seconds.
    assert_relative_eq!(wait, 1.333334, epsilon = 1e-6);
    assert_eq!(seq.interface().note_ons(), vec![60, 62]);
}
