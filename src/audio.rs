//! Input devices and WAV encoding

use std::path::Path;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleRate, StreamConfig};
use serde::Serialize;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// An available audio input device
#[derive(Debug, Clone, Serialize)]
pub struct InputDevice {
    /// Device name as reported by the host
    pub name: String,
    /// Whether this is the host's default input
    pub is_default: bool,
}

/// List the input devices of the default host
///
/// # Errors
///
/// Returns error if devices cannot be enumerated
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|device| device.name().ok())
        .map(|name| InputDevice {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    Ok(devices)
}

/// Open an input device and pick a 16kHz mono configuration
///
/// Uses the default input device when `name` is `None`.
///
/// # Errors
///
/// Returns error if the device is missing or has no suitable configuration
pub fn open_input(name: Option<&str>) -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("input device not found: {name}")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?,
    };

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio input opened"
    );

    Ok((device, config))
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Write a speech segment to a WAV file at [`SAMPLE_RATE`]
///
/// # Errors
///
/// Returns error if encoding or writing fails
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    std::fs::write(path, wav)?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "wrote speech segment");
    Ok(())
}
