//! Sequencer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`Sequencer`](crate::Sequencer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// PCM rate used by `play_stream`.
    pub sample_rate: u32,
    /// Bytes per PCM frame used by `play_stream`.
    pub frame_size: usize,
    /// Seconds appended to the song and waited out at song end.
    pub post_song_wait: f64,
    pub loop_enabled: bool,
    /// Times to play the loop, -1 for forever.
    pub loop_count: i32,
    /// Fire loop hooks but stop at the loop end instead of jumping.
    pub loop_hooks_only: bool,
    pub tempo_multiplier: f64,
    /// Song to load from multi-song containers.
    pub song_number: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 4,
            post_song_wait: 1.0,
            loop_enabled: false,
            loop_count: -1,
            loop_hooks_only: false,
            tempo_multiplier: 1.0,
            song_number: 0,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.frame_size == 0 {
            return Err(Error::InvalidConfig("frame_size must be non-zero".into()));
        }
        if !self.post_song_wait.is_finite() || self.post_song_wait < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "post_song_wait {} must be a non-negative number of seconds",
                self.post_song_wait
            )));
        }
        if !self.tempo_multiplier.is_finite() || self.tempo_multiplier <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "tempo_multiplier {} must be positive",
                self.tempo_multiplier
            )));
        }
        if self.loop_count < -1 {
            return Err(Error::InvalidConfig(format!(
                "loop_count {} must be -1 (forever) or a play count",
                self.loop_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SequencerConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.loop_count, -1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let bad = [
            SequencerConfig { sample_rate: 4000, ..Default::default() },
            SequencerConfig { frame_size: 0, ..Default::default() },
            SequencerConfig { post_song_wait: -0.5, ..Default::default() },
            SequencerConfig { tempo_multiplier: 0.0, ..Default::default() },
            SequencerConfig { loop_count: -2, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}
