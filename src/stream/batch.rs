//! Frames to fixed-size batches.

use bytes::Bytes;

use super::Frame;

/// Consecutive frames processed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    frames: Vec<Frame>,
}

impl Batch {
    /// Wrap frames as a batch.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Frames in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the batch holds no frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Raw payloads to forward when the batch passes.
    pub fn into_raw(self) -> Vec<Bytes> {
        self.frames.into_iter().map(|f| f.raw).collect()
    }
}

/// Groups frames into batches of `batch_size`.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    queue: Vec<Frame>,
}

impl BatchAccumulator {
    /// `batch_size` below 1 is raised to 1.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            queue: Vec::with_capacity(batch_size),
        }
    }

    /// Queue a frame; returns a full batch when one is ready.
    pub fn push(&mut self, frame: Frame) -> Option<Batch> {
        self.queue.push(frame);
        if self.queue.len() >= self.batch_size {
            let frames = std::mem::replace(&mut self.queue, Vec::with_capacity(self.batch_size));
            Some(Batch::new(frames))
        } else {
            None
        }
    }

    /// The partial batch left at end of stream.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.queue.is_empty() {
            None
        } else {
            Some(Batch::new(std::mem::take(&mut self.queue)))
        }
    }
}
