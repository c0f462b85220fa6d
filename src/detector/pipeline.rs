//! Framing, scoring and segmentation of captured audio

use super::{FrameEvent, FrameProcessor, SpeechProbabilities, SpeechScorer};
use crate::options::{Callbacks, DetectorOptions};

/// Something a detector reports to its callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A frame was scored
    Frame(SpeechProbabilities),
    /// A segment event occurred
    Event(FrameEvent),
}

impl Notification {
    /// Invoke the matching callback, if one is set
    pub fn deliver(self, callbacks: &Callbacks) {
        match self {
            Self::Frame(probs) => {
                if let Some(handler) = &callbacks.on_frame_processed {
                    handler(probs);
                }
            }
            Self::Event(FrameEvent::SpeechStart) => {
                if let Some(handler) = &callbacks.on_speech_start {
                    handler();
                }
            }
            Self::Event(FrameEvent::SpeechEnd(audio)) => {
                if let Some(handler) = &callbacks.on_speech_end {
                    handler(audio);
                }
            }
            Self::Event(FrameEvent::Misfire) => {
                if let Some(handler) = &callbacks.on_misfire {
                    handler();
                }
            }
        }
    }
}

/// Cuts a sample stream into fixed-size frames, scores them and runs
/// segmentation
///
/// Notifications are returned rather than delivered so callers can invoke
/// callbacks after releasing any lock around the pipeline.
pub struct FramePipeline {
    frame_samples: usize,
    pending: Vec<f32>,
    scorer: Box<dyn SpeechScorer>,
    processor: FrameProcessor,
}

impl FramePipeline {
    /// Create an inactive pipeline
    #[must_use]
    pub fn new(options: &DetectorOptions, scorer: Box<dyn SpeechScorer>) -> Self {
        let frame_samples = options.frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
            scorer,
            processor: FrameProcessor::new(options),
        }
    }

    /// Start processing frames
    pub const fn resume(&mut self) {
        self.processor.resume();
    }

    /// Stop processing frames, flushing partial input
    pub fn pause(&mut self) -> Vec<Notification> {
        self.pending.clear();
        self.scorer.reset();
        self.processor
            .pause()
            .map(Notification::Event)
            .into_iter()
            .collect()
    }

    /// Feed captured samples
    pub fn push(&mut self, samples: &[f32]) -> Vec<Notification> {
        if !self.processor.is_active() {
            return Vec::new();
        }

        self.pending.extend_from_slice(samples);

        let mut notifications = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            let probs = self.scorer.score(&frame);
            notifications.push(Notification::Frame(probs));
            if let Some(event) = self.processor.process(&frame, probs) {
                notifications.push(Notification::Event(event));
            }
        }

        notifications
    }

    /// Check if frames are being processed
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.processor.is_active()
    }
}
