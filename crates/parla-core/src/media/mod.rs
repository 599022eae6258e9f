//! Audio capture and import helpers.

use std::io::Cursor;

use crate::{Error, Result};

/// WAV encoding options for captured voice recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// PCM sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Number of interleaved audio channels.
    pub channels: u16,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
        }
    }
}

impl CaptureOptions {
    fn validate(self) -> Result<Self> {
        if self.sample_rate_hz == 0 {
            return Err(Error::InvalidInput(
                "Capture sample_rate_hz must be greater than zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(Error::InvalidInput(
                "Capture channels must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Encode interleaved PCM16 samples as a WAV byte buffer.
pub fn encode_capture_wav(samples_pcm16: &[i16], options: CaptureOptions) -> Result<Vec<u8>> {
    let options = options.validate()?;

    let spec = hound::WavSpec {
        channels: options.channels,
        sample_rate: options.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|error| {
            Error::InvalidInput(format!("Failed to initialize WAV writer: {error}"))
        })?;

        for &sample in samples_pcm16 {
            writer.write_sample(sample).map_err(|error| {
                Error::InvalidInput(format!("Failed to write WAV sample: {error}"))
            })?;
        }

        writer.finalize().map_err(|error| {
            Error::InvalidInput(format!("Failed to finalize WAV data: {error}"))
        })?;
    }

    Ok(cursor.into_inner())
}

/// Duration in whole seconds of a WAV byte buffer, rounded down.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<i64> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|error| Error::InvalidInput(format!("Invalid WAV data: {error}")))?;
    let spec = reader.spec();
    let frames = u64::from(reader.duration());
    Ok(i64::try_from(frames / u64::from(spec.sample_rate)).unwrap_or(i64::MAX))
}

/// Best-effort mime type from a file name's extension.
#[must_use]
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" | "aac" => "audio/aac",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
