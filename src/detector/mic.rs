//! Microphone detector
//!
//! cpal streams are not `Send`, so each detector owns a dedicated audio thread
//! that opens the device, runs the stream and drops it on shutdown.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use super::{AudioChunk, Detector, DetectorFactory, EnergyScorer, FramePipeline, SpeechScorer};
use crate::audio::open_input;
use crate::options::{Callbacks, DetectorOptions};
use crate::{Error, Result};

/// Capacity of the raw audio broadcast channel
const AUDIO_CHANNEL_CAPACITY: usize = 64;

type ScorerFactory = Arc<dyn Fn() -> Box<dyn SpeechScorer> + Send + Sync>;

/// Builds [`MicDetector`]s on the default audio host
#[derive(Clone)]
pub struct MicDetectorFactory {
    scorer: ScorerFactory,
}

impl Default for MicDetectorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MicDetectorFactory {
    /// Create a factory using the energy scorer
    #[must_use]
    pub fn new() -> Self {
        Self {
            scorer: Arc::new(|| -> Box<dyn SpeechScorer> { Box::new(EnergyScorer::default()) }),
        }
    }

    /// Use a different scorer for detectors built by this factory
    #[must_use]
    pub fn with_scorer<F>(mut self, scorer: F) -> Self
    where
        F: Fn() -> Box<dyn SpeechScorer> + Send + Sync + 'static,
    {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Build the frame pipeline a detector from this factory runs
    #[must_use]
    pub fn pipeline(&self, options: &DetectorOptions) -> FramePipeline {
        FramePipeline::new(options, (self.scorer)())
    }
}

#[async_trait]
impl DetectorFactory for MicDetectorFactory {
    async fn create(&self, options: DetectorOptions) -> Result<Box<dyn Detector>> {
        if options.frame_samples == 0 {
            return Err(Error::Config("frame_samples must be greater than zero".to_string()));
        }

        let id = Uuid::new_v4();
        let pipeline = Arc::new(Mutex::new(self.pipeline(&options)));
        let (audio_tx, _) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let worker = {
            let pipeline = Arc::clone(&pipeline);
            let callbacks = options.callbacks.clone();
            let audio_tx = audio_tx.clone();
            let device = options.input_device.clone();
            std::thread::Builder::new()
                .name(format!("beacon-vad-audio-{id}"))
                .spawn(move || {
                    run_audio_thread(
                        device.as_deref(),
                        &pipeline,
                        &callbacks,
                        &audio_tx,
                        ready_tx,
                        &shutdown_rx,
                    );
                })?
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                tracing::debug!(%id, "microphone detector created");
                Ok(Box::new(MicDetector {
                    id,
                    pipeline,
                    callbacks: options.callbacks,
                    audio_tx,
                    worker: Mutex::new(Some(Worker {
                        shutdown: shutdown_tx,
                        handle: worker,
                    })),
                }))
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(Error::Detector(
                    "audio thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

/// Open the input stream, report readiness, then hold the stream until shutdown
fn run_audio_thread(
    device: Option<&str>,
    pipeline: &Arc<Mutex<FramePipeline>>,
    callbacks: &Callbacks,
    audio_tx: &broadcast::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<Result<()>>,
    shutdown_rx: &mpsc::Receiver<()>,
) {
    let stream = match build_stream(device, pipeline, callbacks, audio_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(())).is_err() {
        // Creator went away before the stream was handed over
        return;
    }

    // Returns on shutdown or when the detector is dropped
    let _ = shutdown_rx.recv();
    drop(stream);
    tracing::debug!("audio stream closed");
}

fn build_stream(
    device: Option<&str>,
    pipeline: &Arc<Mutex<FramePipeline>>,
    callbacks: &Callbacks,
    audio_tx: &broadcast::Sender<AudioChunk>,
) -> Result<cpal::Stream> {
    let (device, config) = open_input(device)?;

    let pipeline = Arc::clone(pipeline);
    let callbacks = callbacks.clone();
    let audio_tx = audio_tx.clone();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // No receivers is fine
                let _ = audio_tx.send(AudioChunk::from(data));

                let notifications = match pipeline.lock() {
                    Ok(mut guard) => guard.push(data),
                    Err(_) => return,
                };
                for notification in notifications {
                    notification.deliver(&callbacks);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

struct Worker {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Voice activity detector reading from a microphone
pub struct MicDetector {
    id: Uuid,
    pipeline: Arc<Mutex<FramePipeline>>,
    callbacks: Callbacks,
    audio_tx: broadcast::Sender<AudioChunk>,
    worker: Mutex<Option<Worker>>,
}

impl MicDetector {
    /// Check if the audio stream is still open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Detector for MicDetector {
    fn start(&self) {
        self.pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resume();
        tracing::debug!(id = %self.id, "detection started");
    }

    fn pause(&self) {
        let notifications = self
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pause();
        for notification in notifications {
            notification.deliver(&self.callbacks);
        }
        tracing::debug!(id = %self.id, "detection paused");
    }

    fn destroy(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { shutdown, handle }) = worker {
            let _ = shutdown.send(());
            if handle.join().is_err() {
                tracing::error!(id = %self.id, "audio thread panicked");
            }
            tracing::debug!(id = %self.id, "detector destroyed");
        }
    }

    fn audio_stream(&self) -> Option<broadcast::Receiver<AudioChunk>> {
        self.is_open().then(|| self.audio_tx.subscribe())
    }
}

impl Drop for MicDetector {
    fn drop(&mut self) {
        self.destroy();
    }
}
