//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_vad::{
    AudioChunk, Callbacks, Detector, DetectorFactory, DetectorOptions, Error, Result,
    SpeechProbabilities,
};
use tokio::sync::{Semaphore, broadcast};

/// Counters shared between a factory and the detectors it builds
#[derive(Debug, Default)]
pub struct Stats {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub started: AtomicUsize,
    pub paused: AtomicUsize,
}

impl Stats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn paused(&self) -> usize {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Detector that counts calls
///
/// Like the microphone detector, `pause` submits the in-progress segment
/// through `on_speech_end` when `submit_user_speech_on_pause` is set.
pub struct MockDetector {
    stats: Arc<Stats>,
    callbacks: Callbacks,
    submit_on_pause: bool,
    audio_tx: broadcast::Sender<AudioChunk>,
    destroyed: AtomicBool,
}

impl Detector for MockDetector {
    fn start(&self) {
        self.stats.started.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.stats.paused.fetch_add(1, Ordering::SeqCst);
        if self.submit_on_pause
            && let Some(handler) = &self.callbacks.on_speech_end
        {
            handler(vec![0.0; 16]);
        }
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn audio_stream(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        (!self.destroyed.load(Ordering::SeqCst)).then(|| self.audio_tx.subscribe())
    }
}

impl Drop for MockDetector {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Factory with scripted outcomes and an optional gate
///
/// Each `create` pops the next scripted outcome (success once the script is
/// exhausted). A gated factory blocks `create` until [`release`](Self::release).
pub struct MockFactory {
    pub stats: Arc<Stats>,
    outcomes: Mutex<VecDeque<std::result::Result<(), String>>>,
    gate: Option<Semaphore>,
    last_options: Mutex<Option<DetectorOptions>>,
    audio_tx: broadcast::Sender<AudioChunk>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Factory whose `create` waits for `release`
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Semaphore::new(0))))
    }

    /// Factory failing its first constructions with the given messages
    pub fn failing(messages: &[&str]) -> Arc<Self> {
        let factory = Self::build(None);
        factory
            .outcomes
            .lock()
            .unwrap()
            .extend(messages.iter().map(|m| Err((*m).to_string())));
        Arc::new(factory)
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            stats: Arc::new(Stats::default()),
            outcomes: Mutex::new(VecDeque::new()),
            gate,
            last_options: Mutex::new(None),
            audio_tx: broadcast::channel(16).0,
        }
    }

    /// Make the next construction fail with `message`
    pub fn fail_next(&self, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// Let one gated construction complete
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Options passed to the most recent construction
    pub fn last_options(&self) -> Option<DetectorOptions> {
        self.last_options.lock().unwrap().clone()
    }

    /// Feed a frame score through the most recent detector options
    pub fn emit_frame(&self, is_speech: f32) {
        let handler = self
            .last_options()
            .and_then(|options| options.callbacks.on_frame_processed)
            .expect("no frame handler captured");
        handler(SpeechProbabilities::new(is_speech));
    }

    /// Send raw audio to every stream subscriber, returning how many got it
    pub fn emit_audio(&self, samples: &[f32]) -> usize {
        self.audio_tx.send(AudioChunk::from(samples)).unwrap_or(0)
    }
}

#[async_trait]
impl DetectorFactory for MockFactory {
    async fn create(&self, options: DetectorOptions) -> Result<Box<dyn Detector>> {
        let callbacks = options.callbacks.clone();
        let submit_on_pause = options.submit_user_speech_on_pause;
        *self.last_options.lock().unwrap() = Some(options);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => {
                self.stats.created.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockDetector {
                    stats: Arc::clone(&self.stats),
                    callbacks,
                    submit_on_pause,
                    audio_tx: self.audio_tx.clone(),
                    destroyed: AtomicBool::new(false),
                }))
            }
            Err(message) => Err(Error::Detector(message)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
