//! Detector pipeline integration tests
//!
//! Tests framing, scoring and segmentation without requiring audio hardware

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use beacon_vad::audio::{SAMPLE_RATE, samples_to_wav, write_wav};
use beacon_vad::detector::{FramePipeline, Notification};
use beacon_vad::{
    DetectorFactory, DetectorOptions, EnergyScorer, Error, FrameEvent, MicDetectorFactory,
    PartialVadOptions, SpeechProbabilities, SpeechScorer, VadOptions, split,
};

const FRAME: usize = 1536;

/// Generate `frames` frames of a sine tone
fn generate_tone(frames: usize, amplitude: f32) -> Vec<f32> {
    (0..frames * FRAME)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect()
}

/// Generate `frames` frames of silence
fn generate_silence(frames: usize) -> Vec<f32> {
    vec![0.0; frames * FRAME]
}

fn pipeline_with(options: &DetectorOptions) -> FramePipeline {
    let mut pipeline = FramePipeline::new(options, Box::new(EnergyScorer::default()));
    pipeline.resume();
    pipeline
}

fn events(notifications: Vec<Notification>) -> Vec<FrameEvent> {
    notifications
        .into_iter()
        .filter_map(|n| match n {
            Notification::Event(event) => Some(event),
            Notification::Frame(_) => None,
        })
        .collect()
}

#[test]
fn test_energy_scorer_separates_tone_from_silence() {
    let mut scorer = EnergyScorer::default();

    let tone = scorer.score(&generate_tone(1, 0.3));
    assert!(tone.is_speech > 0.9);

    let silence = scorer.score(&generate_silence(1));
    assert!(silence.is_speech < 0.01);
    assert!(silence.not_speech > 0.99);
}

#[test]
fn test_speech_segment_includes_padding() {
    let mut pipeline = pipeline_with(&DetectorOptions::default());

    assert!(events(pipeline.push(&generate_silence(3))).is_empty());
    assert_eq!(
        events(pipeline.push(&generate_tone(5, 0.3))),
        vec![FrameEvent::SpeechStart]
    );

    let ended = events(pipeline.push(&generate_silence(8)));
    assert_eq!(ended.len(), 1);
    match &ended[0] {
        // One padding frame, five speech frames, eight redemption frames
        FrameEvent::SpeechEnd(audio) => assert_eq!(audio.len(), 14 * FRAME),
        other => panic!("expected speech end, got {other:?}"),
    }
}

#[test]
fn test_short_speech_is_a_misfire() {
    let mut pipeline = pipeline_with(&DetectorOptions::default());

    pipeline.push(&generate_tone(2, 0.3));
    let ended = events(pipeline.push(&generate_silence(8)));

    assert_eq!(ended, vec![FrameEvent::Misfire]);
}

#[test]
fn test_brief_pause_does_not_end_speech() {
    let mut pipeline = pipeline_with(&DetectorOptions::default());

    pipeline.push(&generate_tone(4, 0.3));
    assert!(events(pipeline.push(&generate_silence(5))).is_empty());
    assert!(events(pipeline.push(&generate_tone(2, 0.3))).is_empty());

    let ended = events(pipeline.push(&generate_silence(8)));
    assert!(matches!(ended.as_slice(), [FrameEvent::SpeechEnd(_)]));
}

#[test]
fn test_pause_discards_segment_by_default() {
    let mut pipeline = pipeline_with(&DetectorOptions::default());

    pipeline.push(&generate_tone(4, 0.3));
    assert!(pipeline.pause().is_empty());
}

#[test]
fn test_pause_submits_segment_when_configured() {
    let options = DetectorOptions {
        submit_user_speech_on_pause: true,
        ..Default::default()
    };
    let mut pipeline = pipeline_with(&options);

    pipeline.push(&generate_tone(4, 0.3));
    let ended = events(pipeline.pause());

    assert!(matches!(ended.as_slice(), [FrameEvent::SpeechEnd(audio)] if audio.len() == 4 * FRAME));
}

#[test]
fn test_notifications_reach_split_callbacks() {
    let starts = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));
    let speaking = Arc::new(AtomicUsize::new(0));

    let overrides = {
        let starts = Arc::clone(&starts);
        let ends = Arc::clone(&ends);
        PartialVadOptions::default()
            .on_speech_start(move || {
                starts.fetch_add(1, Ordering::SeqCst);
            })
            .on_speech_end(move |_| {
                ends.fetch_add(1, Ordering::SeqCst);
            })
    };
    let speaking_frames = Arc::clone(&speaking);
    let (_, options) = split(&VadOptions::default(), &overrides, move |is_speaking| {
        if is_speaking {
            speaking_frames.fetch_add(1, Ordering::SeqCst);
        }
    });

    let mut pipeline = pipeline_with(&options);
    let mut notifications = pipeline.push(&generate_tone(4, 0.3));
    notifications.extend(pipeline.push(&generate_silence(8)));
    for notification in notifications {
        notification.deliver(&options.callbacks);
    }

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert_eq!(speaking.load(Ordering::SeqCst), 4);
}

#[test]
fn test_probabilities_complement() {
    let probs = SpeechProbabilities::new(0.7);
    assert!((probs.is_speech + probs.not_speech - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_mic_factory_rejects_zero_frame_size() {
    let factory = MicDetectorFactory::new();
    assert_eq!(factory.name(), "microphone");

    let options = DetectorOptions {
        frame_samples: 0,
        ..Default::default()
    };
    let result = tokio_test::block_on(factory.create(options));
    assert!(matches!(result, Err(Error::Config(_))));
}

/// Scorer returning the same probability for every frame
struct FixedScorer(f32);

impl SpeechScorer for FixedScorer {
    fn score(&mut self, _frame: &[f32]) -> SpeechProbabilities {
        SpeechProbabilities::new(self.0)
    }
}

#[test]
fn test_mic_factory_uses_custom_scorer() {
    let factory = MicDetectorFactory::new()
        .with_scorer(|| -> Box<dyn SpeechScorer> { Box::new(FixedScorer(0.9)) });
    let options = DetectorOptions {
        frame_samples: 4,
        ..Default::default()
    };

    let mut pipeline = factory.pipeline(&options);
    pipeline.resume();
    let notifications = pipeline.push(&[0.0; 4]);

    assert_eq!(
        notifications,
        vec![
            Notification::Frame(SpeechProbabilities::new(0.9)),
            Notification::Event(FrameEvent::SpeechStart),
        ]
    );
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_tone(1, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
}

#[test]
fn test_write_wav_segment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("segment-0001.wav");
    let samples = generate_tone(2, 0.5);

    write_wav(&path, &samples).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len() as usize, samples.len());
}
