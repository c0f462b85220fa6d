//! Detector capability driven by the lifecycle controller
//!
//! A [`DetectorFactory`] builds detectors asynchronously from
//! [`DetectorOptions`]; the controller owns the resulting [`Detector`] and
//! starts, pauses and destroys it. [`MicDetectorFactory`] is the microphone
//! implementation.

mod frame;
mod mic;
mod pipeline;
mod scorer;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::Result;
use crate::options::DetectorOptions;

pub use frame::{FrameEvent, FrameProcessor};
pub use mic::{MicDetector, MicDetectorFactory};
pub use pipeline::{FramePipeline, Notification};
pub use scorer::{EnergyScorer, SpeechScorer};

/// Raw audio samples as delivered by the input stream
pub type AudioChunk = Arc<[f32]>;

/// Speech probabilities for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeechProbabilities {
    /// Probability that the frame contains speech
    pub is_speech: f32,
    /// Probability that the frame does not contain speech
    pub not_speech: f32,
}

impl SpeechProbabilities {
    /// Build from a speech probability, clamped to `[0, 1]`
    #[must_use]
    pub fn new(is_speech: f32) -> Self {
        let is_speech = is_speech.clamp(0.0, 1.0);
        Self {
            is_speech,
            not_speech: 1.0 - is_speech,
        }
    }
}

/// A live voice activity detector
///
/// All operations are synchronous and must tolerate redundant calls. The
/// controller never holds its own lock while calling them, so callbacks
/// delivered from inside `pause` may call back into the controller.
pub trait Detector: Send + Sync {
    /// Begin producing frame and speech events
    fn start(&self);

    /// Stop producing events without releasing audio resources
    fn pause(&self);

    /// Release every resource held by the detector
    fn destroy(&self);

    /// Live audio stream, for consumers such as level meters
    fn audio_stream(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        None
    }
}

/// Builds detectors
#[async_trait]
pub trait DetectorFactory: Send + Sync {
    /// Construct a detector
    ///
    /// # Errors
    ///
    /// Returns error if the detector cannot be built (no device, permission
    /// denied, invalid options)
    async fn create(&self, options: DetectorOptions) -> Result<Box<dyn Detector>>;

    /// Factory name for logging
    fn name(&self) -> &'static str;
}
