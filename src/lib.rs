//! Beacon VAD - Microphone voice activity detection with a lifecycle controller
//!
//! This library provides:
//! - A lifecycle controller that owns a voice activity detector and exposes
//!   `initialize`, `terminate`, `start`, `pause` and `toggle`, safe to call in
//!   any order from an event loop
//! - Option splitting between controller and detector settings
//! - A microphone detector built on cpal with pluggable frame scoring
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              UI / application layer                  │
//! │      VadState snapshots  │  operations  │  audio     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 VadController                        │
//! │   lifecycle  │  auto-initialize  │  auto-start       │
//! └────────────────────┬────────────────────────────────┘
//!                      │  DetectorOptions (split)
//! ┌────────────────────▼────────────────────────────────┐
//! │              DetectorFactory / Detector              │
//! │   capture  │  framing  │  scoring  │  segmentation   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod options;

pub use config::Config;
pub use controller::{VadController, VadState};
pub use detector::{
    AudioChunk, Detector, DetectorFactory, EnergyScorer, FrameEvent, MicDetector,
    MicDetectorFactory, SpeechProbabilities, SpeechScorer,
};
pub use error::{Error, Result};
pub use options::{
    Callbacks, ControllerOptions, DetectorOptions, OptionKey, PartialVadOptions, VadOptions,
    split,
};
