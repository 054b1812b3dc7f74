//! Pull-based chunk stream
//!
//! Wraps a chunk iterator and enhances each chunk as it is pulled. Results
//! come out in input order, one per chunk. Chunk-level input errors are
//! yielded and the stream continues; lifecycle errors end it.

use std::iter::FusedIterator;

use crate::engine::EnhancementEngine;
use crate::error::{EnhanceError, EnhanceResult};
use crate::EnhancementResult;

/// Lazy enhancement of a chunk sequence, borrowing the engine
pub struct EnhancementStream<'a, I> {
    /// Session doing the work
    engine: &'a mut EnhancementEngine,
    /// Remaining input
    chunks: I,
    /// Sample rate of every chunk
    sample_rate: u32,
    /// Input exhausted or session unusable
    finished: bool,
}

impl<'a, I> EnhancementStream<'a, I> {
    pub(crate) fn new(engine: &'a mut EnhancementEngine, chunks: I, sample_rate: u32) -> Self {
        Self {
            engine,
            chunks,
            sample_rate,
            finished: false,
        }
    }

    /// Whether the stream has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<I, T> Iterator for EnhancementStream<'_, I>
where
    I: Iterator<Item = T>,
    T: AsRef<[f32]>,
{
    type Item = EnhanceResult<EnhancementResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(chunk) = self.chunks.next() else {
            self.finished = true;
            return None;
        };

        let result = self.engine.process_audio(chunk.as_ref(), self.sample_rate);
        if matches!(
            result,
            Err(EnhanceError::Disposed) | Err(EnhanceError::Uninitialized)
        ) {
            self.finished = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            self.chunks.size_hint()
        }
    }
}

impl<I, T> FusedIterator for EnhancementStream<'_, I>
where
    I: Iterator<Item = T>,
    T: AsRef<[f32]>,
{
}
