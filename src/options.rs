//! Option splitting between the lifecycle controller and the detector
//!
//! Callers configure a controller with one flat set of options. Controller keys
//! tune the lifecycle policies; detector keys are forwarded to the
//! [`DetectorFactory`](crate::detector::DetectorFactory). The two key sets are
//! fixed tables checked at build time to partition [`OptionKey::ALL`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::detector::SpeechProbabilities;
use crate::{Error, Result};

/// Per-frame handler receiving speech probabilities
pub type FrameHandler = Arc<dyn Fn(SpeechProbabilities) + Send + Sync>;

/// Handler for events without a payload (speech start, misfire)
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Handler receiving the audio captured for a finished speech segment
pub type SpeechEndHandler = Arc<dyn Fn(Vec<f32>) + Send + Sync>;

/// Every option the controller recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    StartOnReady,
    UserSpeakingThreshold,
    InitializeOnMount,
    PositiveSpeechThreshold,
    NegativeSpeechThreshold,
    RedemptionFrames,
    FrameSamples,
    PreSpeechPadFrames,
    MinSpeechFrames,
    SubmitUserSpeechOnPause,
    InputDevice,
    OnFrameProcessed,
    OnSpeechStart,
    OnSpeechEnd,
    OnMisfire,
}

/// Which side of the split an option belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    /// Consumed by the lifecycle controller
    Controller,
    /// Forwarded to the detector
    Detector,
}

impl OptionKey {
    /// All recognized keys, in declaration order
    pub const ALL: [Self; 15] = [
        Self::StartOnReady,
        Self::UserSpeakingThreshold,
        Self::InitializeOnMount,
        Self::PositiveSpeechThreshold,
        Self::NegativeSpeechThreshold,
        Self::RedemptionFrames,
        Self::FrameSamples,
        Self::PreSpeechPadFrames,
        Self::MinSpeechFrames,
        Self::SubmitUserSpeechOnPause,
        Self::InputDevice,
        Self::OnFrameProcessed,
        Self::OnSpeechStart,
        Self::OnSpeechEnd,
        Self::OnMisfire,
    ];

    /// Key name as used in config files and `key=value` pairs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartOnReady => "start_on_ready",
            Self::UserSpeakingThreshold => "user_speaking_threshold",
            Self::InitializeOnMount => "initialize_on_mount",
            Self::PositiveSpeechThreshold => "positive_speech_threshold",
            Self::NegativeSpeechThreshold => "negative_speech_threshold",
            Self::RedemptionFrames => "redemption_frames",
            Self::FrameSamples => "frame_samples",
            Self::PreSpeechPadFrames => "pre_speech_pad_frames",
            Self::MinSpeechFrames => "min_speech_frames",
            Self::SubmitUserSpeechOnPause => "submit_user_speech_on_pause",
            Self::InputDevice => "input_device",
            Self::OnFrameProcessed => "on_frame_processed",
            Self::OnSpeechStart => "on_speech_start",
            Self::OnSpeechEnd => "on_speech_end",
            Self::OnMisfire => "on_misfire",
        }
    }

    /// Side of the split this key is routed to
    #[must_use]
    pub const fn scope(self) -> OptionScope {
        match self {
            Self::StartOnReady | Self::UserSpeakingThreshold | Self::InitializeOnMount => {
                OptionScope::Controller
            }
            Self::PositiveSpeechThreshold
            | Self::NegativeSpeechThreshold
            | Self::RedemptionFrames
            | Self::FrameSamples
            | Self::PreSpeechPadFrames
            | Self::MinSpeechFrames
            | Self::SubmitUserSpeechOnPause
            | Self::InputDevice
            | Self::OnFrameProcessed
            | Self::OnSpeechStart
            | Self::OnSpeechEnd
            | Self::OnMisfire => OptionScope::Detector,
        }
    }

    /// Callback keys can only be set programmatically
    #[must_use]
    pub const fn is_callback(self) -> bool {
        matches!(
            self,
            Self::OnFrameProcessed | Self::OnSpeechStart | Self::OnSpeechEnd | Self::OnMisfire
        )
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unrecognized option: {s}")))
    }
}

/// Keys consumed by the lifecycle controller
pub const CONTROLLER_KEYS: [OptionKey; 3] = [
    OptionKey::StartOnReady,
    OptionKey::UserSpeakingThreshold,
    OptionKey::InitializeOnMount,
];

/// Keys forwarded to the detector
pub const DETECTOR_KEYS: [OptionKey; 12] = [
    OptionKey::PositiveSpeechThreshold,
    OptionKey::NegativeSpeechThreshold,
    OptionKey::RedemptionFrames,
    OptionKey::FrameSamples,
    OptionKey::PreSpeechPadFrames,
    OptionKey::MinSpeechFrames,
    OptionKey::SubmitUserSpeechOnPause,
    OptionKey::InputDevice,
    OptionKey::OnFrameProcessed,
    OptionKey::OnSpeechStart,
    OptionKey::OnSpeechEnd,
    OptionKey::OnMisfire,
];

/// Each key appears in exactly one table, and in the table matching its scope
const fn key_tables_partition_all_keys() -> bool {
    let mut seen = [0u8; OptionKey::ALL.len()];

    let mut i = 0;
    while i < CONTROLLER_KEYS.len() {
        let key = CONTROLLER_KEYS[i];
        if !matches!(key.scope(), OptionScope::Controller) {
            return false;
        }
        seen[key as usize] += 1;
        i += 1;
    }

    let mut i = 0;
    while i < DETECTOR_KEYS.len() {
        let key = DETECTOR_KEYS[i];
        if !matches!(key.scope(), OptionScope::Detector) {
            return false;
        }
        seen[key as usize] += 1;
        i += 1;
    }

    let mut i = 0;
    while i < seen.len() {
        if seen[i] != 1 {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    key_tables_partition_all_keys(),
    "controller and detector key tables must partition OptionKey::ALL"
);

/// Detector callbacks
///
/// Handlers are invoked on the detector's audio thread.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Called for every processed frame
    pub on_frame_processed: Option<FrameHandler>,
    /// Called when a speech segment begins
    pub on_speech_start: Option<EventHandler>,
    /// Called with the captured audio when a speech segment ends
    pub on_speech_end: Option<SpeechEndHandler>,
    /// Called when a segment was too short to count as speech
    pub on_misfire: Option<EventHandler>,
}

impl Callbacks {
    /// Merge `other` over `self`, per handler
    #[must_use]
    pub fn overlay(self, other: Self) -> Self {
        Self {
            on_frame_processed: other.on_frame_processed.or(self.on_frame_processed),
            on_speech_start: other.on_speech_start.or(self.on_speech_start),
            on_speech_end: other.on_speech_end.or(self.on_speech_end),
            on_misfire: other.on_misfire.or(self.on_misfire),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_frame_processed", &self.on_frame_processed.is_some())
            .field("on_speech_start", &self.on_speech_start.is_some())
            .field("on_speech_end", &self.on_speech_end.is_some())
            .field("on_misfire", &self.on_misfire.is_some())
            .finish()
    }
}

/// Fully resolved options, before splitting
#[derive(Debug, Clone)]
pub struct VadOptions {
    /// Start listening as soon as the detector becomes ready
    pub start_on_ready: bool,
    /// Frame score above which the user counts as speaking
    pub user_speaking_threshold: f32,
    /// Initialize the detector when the controller is mounted
    pub initialize_on_mount: bool,
    /// Frame score at or above which a frame is speech
    pub positive_speech_threshold: f32,
    /// Frame score below which a frame counts towards ending speech
    pub negative_speech_threshold: f32,
    /// Non-speech frames tolerated before a segment ends
    pub redemption_frames: usize,
    /// Samples per analysed frame
    pub frame_samples: usize,
    /// Frames kept from before speech started
    pub pre_speech_pad_frames: usize,
    /// Speech frames required for a segment to not be a misfire
    pub min_speech_frames: usize,
    /// Emit the in-progress segment when paused instead of dropping it
    pub submit_user_speech_on_pause: bool,
    /// Input device name (default device when absent)
    pub input_device: Option<String>,
    /// Detector callbacks
    pub callbacks: Callbacks,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self {
            start_on_ready: true,
            user_speaking_threshold: 0.6,
            initialize_on_mount: true,
            positive_speech_threshold: 0.5,
            negative_speech_threshold: 0.35,
            redemption_frames: 8,
            frame_samples: 1536,
            pre_speech_pad_frames: 1,
            min_speech_frames: 3,
            submit_user_speech_on_pause: false,
            input_device: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl VadOptions {
    /// Merge `overrides` over these options; each present override wins
    #[must_use]
    pub fn merged(&self, overrides: &PartialVadOptions) -> Self {
        let o = overrides.clone();
        Self {
            start_on_ready: o.start_on_ready.unwrap_or(self.start_on_ready),
            user_speaking_threshold: o
                .user_speaking_threshold
                .unwrap_or(self.user_speaking_threshold),
            initialize_on_mount: o.initialize_on_mount.unwrap_or(self.initialize_on_mount),
            positive_speech_threshold: o
                .positive_speech_threshold
                .unwrap_or(self.positive_speech_threshold),
            negative_speech_threshold: o
                .negative_speech_threshold
                .unwrap_or(self.negative_speech_threshold),
            redemption_frames: o.redemption_frames.unwrap_or(self.redemption_frames),
            frame_samples: o.frame_samples.unwrap_or(self.frame_samples),
            pre_speech_pad_frames: o.pre_speech_pad_frames.unwrap_or(self.pre_speech_pad_frames),
            min_speech_frames: o.min_speech_frames.unwrap_or(self.min_speech_frames),
            submit_user_speech_on_pause: o
                .submit_user_speech_on_pause
                .unwrap_or(self.submit_user_speech_on_pause),
            input_device: o.input_device.or_else(|| self.input_device.clone()),
            callbacks: self.callbacks.clone().overlay(o.callbacks),
        }
    }
}

/// Caller-supplied options; absent fields fall back to defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialVadOptions {
    pub start_on_ready: Option<bool>,
    pub user_speaking_threshold: Option<f32>,
    pub initialize_on_mount: Option<bool>,
    pub positive_speech_threshold: Option<f32>,
    pub negative_speech_threshold: Option<f32>,
    pub redemption_frames: Option<usize>,
    pub frame_samples: Option<usize>,
    pub pre_speech_pad_frames: Option<usize>,
    pub min_speech_frames: Option<usize>,
    pub submit_user_speech_on_pause: Option<bool>,
    pub input_device: Option<String>,
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl PartialVadOptions {
    /// Set an option from its textual form
    ///
    /// Returns `Ok(false)` when `key` is not a recognized option; such keys
    /// are dropped rather than treated as errors.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be parsed, or the key names a callback
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        let Ok(key) = key.parse::<OptionKey>() else {
            return Ok(false);
        };

        match key {
            OptionKey::StartOnReady => self.start_on_ready = Some(parse_bool(key, value)?),
            OptionKey::UserSpeakingThreshold => {
                self.user_speaking_threshold = Some(parse_value(key, value)?);
            }
            OptionKey::InitializeOnMount => {
                self.initialize_on_mount = Some(parse_bool(key, value)?);
            }
            OptionKey::PositiveSpeechThreshold => {
                self.positive_speech_threshold = Some(parse_value(key, value)?);
            }
            OptionKey::NegativeSpeechThreshold => {
                self.negative_speech_threshold = Some(parse_value(key, value)?);
            }
            OptionKey::RedemptionFrames => self.redemption_frames = Some(parse_value(key, value)?),
            OptionKey::FrameSamples => self.frame_samples = Some(parse_value(key, value)?),
            OptionKey::PreSpeechPadFrames => {
                self.pre_speech_pad_frames = Some(parse_value(key, value)?);
            }
            OptionKey::MinSpeechFrames => self.min_speech_frames = Some(parse_value(key, value)?),
            OptionKey::SubmitUserSpeechOnPause => {
                self.submit_user_speech_on_pause = Some(parse_bool(key, value)?);
            }
            OptionKey::InputDevice => self.input_device = Some(value.to_string()),
            OptionKey::OnFrameProcessed
            | OptionKey::OnSpeechStart
            | OptionKey::OnSpeechEnd
            | OptionKey::OnMisfire => {
                return Err(Error::Config(format!(
                    "{key} is a callback and cannot be set from text"
                )));
            }
        }

        Ok(true)
    }

    /// Merge `other` over `self`; fields present in `other` win
    #[must_use]
    pub fn overlay(self, other: Self) -> Self {
        Self {
            start_on_ready: other.start_on_ready.or(self.start_on_ready),
            user_speaking_threshold: other.user_speaking_threshold.or(self.user_speaking_threshold),
            initialize_on_mount: other.initialize_on_mount.or(self.initialize_on_mount),
            positive_speech_threshold: other
                .positive_speech_threshold
                .or(self.positive_speech_threshold),
            negative_speech_threshold: other
                .negative_speech_threshold
                .or(self.negative_speech_threshold),
            redemption_frames: other.redemption_frames.or(self.redemption_frames),
            frame_samples: other.frame_samples.or(self.frame_samples),
            pre_speech_pad_frames: other.pre_speech_pad_frames.or(self.pre_speech_pad_frames),
            min_speech_frames: other.min_speech_frames.or(self.min_speech_frames),
            submit_user_speech_on_pause: other
                .submit_user_speech_on_pause
                .or(self.submit_user_speech_on_pause),
            input_device: other.input_device.or(self.input_device),
            callbacks: self.callbacks.overlay(other.callbacks),
        }
    }

    /// Check value ranges of the options that are present
    ///
    /// # Errors
    ///
    /// Returns error if a threshold lies outside `[0, 1]` or a frame size is zero
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            (OptionKey::UserSpeakingThreshold, self.user_speaking_threshold),
            (OptionKey::PositiveSpeechThreshold, self.positive_speech_threshold),
            (OptionKey::NegativeSpeechThreshold, self.negative_speech_threshold),
        ];
        for (key, value) in thresholds {
            if let Some(value) = value
                && !(0.0..=1.0).contains(&value)
            {
                return Err(Error::Config(format!(
                    "{key} must be between 0 and 1, got {value}"
                )));
            }
        }

        if self.frame_samples == Some(0) {
            return Err(Error::Config(format!(
                "{} must be greater than zero",
                OptionKey::FrameSamples
            )));
        }

        Ok(())
    }

    /// Set the per-frame handler
    #[must_use]
    pub fn on_frame_processed(
        mut self,
        handler: impl Fn(SpeechProbabilities) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_frame_processed = Some(Arc::new(handler));
        self
    }

    /// Set the speech-start handler
    #[must_use]
    pub fn on_speech_start(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_speech_start = Some(Arc::new(handler));
        self
    }

    /// Set the speech-end handler
    #[must_use]
    pub fn on_speech_end(mut self, handler: impl Fn(Vec<f32>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_speech_end = Some(Arc::new(handler));
        self
    }

    /// Set the misfire handler
    #[must_use]
    pub fn on_misfire(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_misfire = Some(Arc::new(handler));
        self
    }
}

fn parse_value<T>(key: OptionKey, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value for {key}: {value:?} ({e})")))
}

fn parse_bool(key: OptionKey, value: &str) -> Result<bool> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::Config(format!(
            "invalid value for {key}: {value:?} (expected true or false)"
        )))
    }
}

/// Options consumed by the lifecycle controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerOptions {
    pub start_on_ready: bool,
    pub user_speaking_threshold: f32,
    pub initialize_on_mount: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        let VadOptions {
            start_on_ready,
            user_speaking_threshold,
            initialize_on_mount,
            ..
        } = VadOptions::default();
        Self {
            start_on_ready,
            user_speaking_threshold,
            initialize_on_mount,
        }
    }
}

/// Options forwarded to the detector
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub positive_speech_threshold: f32,
    pub negative_speech_threshold: f32,
    pub redemption_frames: usize,
    pub frame_samples: usize,
    pub pre_speech_pad_frames: usize,
    pub min_speech_frames: usize,
    pub submit_user_speech_on_pause: bool,
    pub input_device: Option<String>,
    pub callbacks: Callbacks,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        split_merged(VadOptions::default()).1
    }
}

/// Merge `overrides` over `defaults` and split the result
///
/// The returned detector options carry a frame handler that publishes
/// `is_speech > user_speaking_threshold` through `on_speaking`. A frame
/// handler supplied by the caller is kept and runs first.
pub fn split<F>(
    defaults: &VadOptions,
    overrides: &PartialVadOptions,
    on_speaking: F,
) -> (ControllerOptions, DetectorOptions)
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let (controller, mut detector) = split_merged(defaults.merged(overrides));
    detector.callbacks.on_frame_processed = Some(speaking_handler(
        detector.callbacks.on_frame_processed.take(),
        controller.user_speaking_threshold,
        on_speaking,
    ));
    (controller, detector)
}

/// Partition resolved options without injecting anything
///
/// The destructure is exhaustive so a new option must be routed here.
fn split_merged(options: VadOptions) -> (ControllerOptions, DetectorOptions) {
    let VadOptions {
        start_on_ready,
        user_speaking_threshold,
        initialize_on_mount,
        positive_speech_threshold,
        negative_speech_threshold,
        redemption_frames,
        frame_samples,
        pre_speech_pad_frames,
        min_speech_frames,
        submit_user_speech_on_pause,
        input_device,
        callbacks,
    } = options;

    let controller = ControllerOptions {
        start_on_ready,
        user_speaking_threshold,
        initialize_on_mount,
    };
    let detector = DetectorOptions {
        positive_speech_threshold,
        negative_speech_threshold,
        redemption_frames,
        frame_samples,
        pre_speech_pad_frames,
        min_speech_frames,
        submit_user_speech_on_pause,
        input_device,
        callbacks,
    };

    (controller, detector)
}

fn speaking_handler<F>(caller: Option<FrameHandler>, threshold: f32, on_speaking: F) -> FrameHandler
where
    F: Fn(bool) + Send + Sync + 'static,
{
    Arc::new(move |probs: SpeechProbabilities| {
        if let Some(handler) = &caller {
            handler(probs);
        }
        on_speaking(probs.is_speech > threshold);
    })
}
