//! Speech segmentation over scored frames

use std::collections::VecDeque;

use super::SpeechProbabilities;
use crate::options::DetectorOptions;

/// Segment event produced by the frame processor
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// A frame crossed the positive threshold while not speaking
    SpeechStart,
    /// Speech ended; carries the segment audio including pre-speech padding
    SpeechEnd(Vec<f32>),
    /// Speech ended with too few speech frames to count
    Misfire,
}

struct BufferedFrame {
    samples: Vec<f32>,
    is_speech: bool,
}

/// Turns per-frame speech probabilities into speech segments
///
/// A segment starts at the first frame scoring at or above the positive
/// threshold. It ends once `redemption_frames` frames have scored below the
/// negative threshold; segments with fewer than `min_speech_frames` speech
/// frames are reported as misfires.
pub struct FrameProcessor {
    positive_speech_threshold: f32,
    negative_speech_threshold: f32,
    redemption_frames: usize,
    pre_speech_pad_frames: usize,
    min_speech_frames: usize,
    submit_user_speech_on_pause: bool,
    buffer: VecDeque<BufferedFrame>,
    speaking: bool,
    redemption_counter: usize,
    active: bool,
}

impl FrameProcessor {
    /// Create an inactive processor
    #[must_use]
    pub fn new(options: &DetectorOptions) -> Self {
        Self {
            positive_speech_threshold: options.positive_speech_threshold,
            negative_speech_threshold: options.negative_speech_threshold,
            redemption_frames: options.redemption_frames,
            pre_speech_pad_frames: options.pre_speech_pad_frames,
            min_speech_frames: options.min_speech_frames,
            submit_user_speech_on_pause: options.submit_user_speech_on_pause,
            buffer: VecDeque::new(),
            speaking: false,
            redemption_counter: 0,
            active: false,
        }
    }

    /// Start accepting frames
    pub const fn resume(&mut self) {
        self.active = true;
    }

    /// Stop accepting frames
    ///
    /// The in-progress segment is either submitted or discarded, depending on
    /// `submit_user_speech_on_pause`.
    pub fn pause(&mut self) -> Option<FrameEvent> {
        self.active = false;
        if self.submit_user_speech_on_pause {
            self.end_segment()
        } else {
            self.reset();
            None
        }
    }

    /// Feed one scored frame
    ///
    /// Frames are ignored while the processor is inactive.
    pub fn process(&mut self, frame: &[f32], probs: SpeechProbabilities) -> Option<FrameEvent> {
        if !self.active {
            return None;
        }

        let is_speech = probs.is_speech >= self.positive_speech_threshold;
        self.buffer.push_back(BufferedFrame {
            samples: frame.to_vec(),
            is_speech,
        });

        if is_speech {
            self.redemption_counter = 0;
            if !self.speaking {
                self.speaking = true;
                tracing::trace!(score = probs.is_speech, "speech started");
                return Some(FrameEvent::SpeechStart);
            }
        }

        if probs.is_speech < self.negative_speech_threshold && self.speaking {
            self.redemption_counter += 1;
            if self.redemption_counter >= self.redemption_frames {
                return self.end_segment();
            }
        }

        if !self.speaking {
            while self.buffer.len() > self.pre_speech_pad_frames {
                self.buffer.pop_front();
            }
        }

        None
    }

    /// Close the current segment, if any
    pub fn end_segment(&mut self) -> Option<FrameEvent> {
        let was_speaking = self.speaking;
        let frames = std::mem::take(&mut self.buffer);
        self.reset();

        if !was_speaking {
            return None;
        }

        let speech_frames = frames.iter().filter(|f| f.is_speech).count();
        if speech_frames >= self.min_speech_frames {
            let audio: Vec<f32> = frames.into_iter().flat_map(|f| f.samples).collect();
            tracing::trace!(speech_frames, samples = audio.len(), "speech ended");
            Some(FrameEvent::SpeechEnd(audio))
        } else {
            tracing::trace!(speech_frames, "speech segment too short, misfire");
            Some(FrameEvent::Misfire)
        }
    }

    /// Drop buffered audio and segment state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.speaking = false;
        self.redemption_counter = 0;
    }

    /// Check if a segment is in progress
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Check if frames are being accepted
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }
}
