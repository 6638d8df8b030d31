//! A fully built song: rows, timing, loop points and text metadata.

use tracing::debug;

use crate::error::Result;
use crate::format::{self, CmfInstrument, FileFormat, Source, SourceBody};
use crate::fraction::Fraction;
use crate::loop_state::LoopStackEntry;
use crate::parser::ParserContext;
use crate::position::Position;
use crate::timeline::{build_timeline, Marker};
use crate::track::{build_track_data, Row};

/// Immutable result of a successful load. Playback state lives elsewhere.
#[derive(Debug, Clone)]
pub(crate) struct Song {
    pub format: FileFormat,
    pub smf_format: u16,
    pub division: u64,
    /// Tempo payload scale, microseconds to seconds per tick.
    pub inv_division: Fraction,
    pub tracks: Vec<Vec<Row>>,
    pub title: String,
    pub copyright: String,
    pub track_titles: Vec<String>,
    pub markers: Vec<Marker>,
    pub cmf_instruments: Vec<CmfInstrument>,
    /// Seconds, including the post-song wait.
    pub length: f64,
    pub loop_start_time: f64,
    pub loop_end_time: f64,
    pub invalid_loop: bool,
    pub loop_stack: Vec<LoopStackEntry>,
    pub track_begin: Position,
    pub loop_begin: Position,
    /// Converted buffers of a multi-song container.
    pub songs: Vec<Vec<u8>>,
    pub song_index: usize,
}

impl Song {
    pub fn load(data: &[u8], song_number: usize, post_song_wait: f64) -> Result<Self> {
        let source = format::load_source(data, song_number)?;
        Self::from_source(source, post_song_wait)
    }

    /// Switches to song `index` of an already converted multi-song set.
    pub fn load_song(songs: Vec<Vec<u8>>, index: usize, post_song_wait: f64) -> Result<Self> {
        let source = format::load_song(songs, index)?;
        Self::from_source(source, post_song_wait)
    }

    pub(crate) fn from_source(source: Source, post_song_wait: f64) -> Result<Self> {
        let inv_division = source.inv_division();
        let mut ctx = ParserContext::new(source.format);
        let mut data = match source.body {
            SourceBody::Tracks {
                tracks,
                leading_delta,
            } => build_track_data(&tracks, leading_delta, inv_division, &mut ctx)?,
            SourceBody::Rows(data) => data,
        };
        let timeline = build_timeline(
            &mut data,
            source.initial_tempo,
            inv_division,
            post_song_wait,
        );

        debug!(
            format = ?source.format,
            tracks = data.tracks.len(),
            division = source.division,
            title = %ctx.title,
            copyright = %ctx.copyright,
            track_titles = ctx.track_titles.len(),
            "Song loaded"
        );

        Ok(Self {
            format: source.format,
            smf_format: source.smf_format,
            division: source.division,
            inv_division,
            tracks: data.tracks,
            title: ctx.title,
            copyright: ctx.copyright,
            track_titles: ctx.track_titles,
            markers: timeline.markers,
            cmf_instruments: source.cmf_instruments,
            length: timeline.length,
            loop_start_time: timeline.loop_start_time,
            loop_end_time: timeline.loop_end_time,
            invalid_loop: data.invalid_loop,
            loop_stack: data.loop_stack,
            track_begin: timeline.track_begin,
            loop_begin: timeline.loop_begin,
            songs: source.songs,
            song_index: source.song_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smf(tracks: &[&[u8]], division: u16) -> Vec<u8> {
        let mut out = b"MThd\0\0\0\x06".to_vec();
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for track in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(track.len() as u32).to_be_bytes());
            out.extend_from_slice(track);
        }
        out
    }

    #[test]
    fn test_load_collects_metadata() {
        let data = smf(
            &[&[
                0x00, 0xFF, 0x03, 5, b'S', b'o', b'n', b'g', b'!',
                0x00, 0xFF, 0x02, 3, b'(', b'c', b')',
                0x00, 0x90, 60, 100, 0x83, 0x60, 0xFF, 0x2F, 0,
            ]],
            480,
        );
        let song = Song::load(&data, 0, 1.0).unwrap();
        assert_eq!(song.format, FileFormat::Midi);
        assert_eq!(song.smf_format, 1);
        assert_eq!(song.title, "Song!");
        assert_eq!(song.copyright, "(c)");
        assert_eq!(song.length, 1.5);
        assert!(song.invalid_loop);
        assert_eq!(song.track_begin.tracks.len(), 1);
    }

    #[test]
    fn test_load_failure_is_an_error() {
        assert!(Song::load(b"not a song at all", 0, 1.0).is_err());
    }
}
