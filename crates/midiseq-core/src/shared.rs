//! Thread-shared sequencer handle.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::interface::MidiRtInterface;
use crate::sequencer::Sequencer;

/// A [`Sequencer`] behind an `Arc<Mutex>`, for a control thread and an
/// audio thread touching the same song.
///
/// Every call locks for its duration. Hold [`lock`](Self::lock) to batch
/// several operations atomically.
pub struct SharedSequencer<I: MidiRtInterface> {
    inner: Arc<Mutex<Sequencer<I>>>,
}

impl<I: MidiRtInterface> Clone for SharedSequencer<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: MidiRtInterface> SharedSequencer<I> {
    pub fn new(sequencer: Sequencer<I>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sequencer)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Sequencer<I>> {
        self.inner.lock()
    }

    pub fn tick(&self, seconds: f64, granularity: f64) -> f64 {
        self.inner.lock().tick(seconds, granularity)
    }

    pub fn seek(&self, seconds: f64, granularity: f64) -> f64 {
        self.inner.lock().seek(seconds, granularity)
    }

    pub fn tell(&self) -> f64 {
        self.inner.lock().tell()
    }

    pub fn set_tempo(&self, multiplier: f64) {
        self.inner.lock().set_tempo(multiplier);
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.inner.lock().set_loop_enabled(enabled);
    }
}

impl<I: MidiRtInterface> From<Sequencer<I>> for SharedSequencer<I> {
    fn from(sequencer: Sequencer<I>) -> Self {
        Self::new(sequencer)
    }
}
