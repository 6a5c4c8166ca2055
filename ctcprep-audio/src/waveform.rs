//! Waveform loading
//!
//! Audio files are decoded into planar `(channels, samples)` arrays. Channels
//! are kept as they are in the file; rejecting multi-channel input is the
//! dataset's job, not the loader's.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader};
use ndarray::{Array2, ArrayView1};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoded audio at its file-native sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples, shape (channels, samples), normalized to [-1, 1]
    samples: Array2<f32>,
    sample_rate: u32,
}

impl Waveform {
    /// Wrap planar samples of shape (channels, samples)
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Result<Self> {
        if samples.nrows() == 0 {
            return Err(AudioError::invalid_input("Waveform has no channels"));
        }
        if sample_rate == 0 {
            return Err(AudioError::invalid_input("Sample rate cannot be zero"));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Single-channel waveform from a sample buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        let len = samples.len();
        let samples = Array2::from_shape_vec((1, len), samples)
            .map_err(|e| AudioError::invalid_input(e.to_string()))?;
        Self::new(samples, sample_rate)
    }

    /// De-interleave `[l0, r0, l1, r1, ...]` into planar channels
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AudioError::invalid_input("Channel count cannot be zero"));
        }
        let frames = interleaved.len() / channels;
        let samples = Array2::from_shape_fn((channels, frames), |(ch, i)| {
            interleaved[i * channels + ch]
        });
        Self::new(samples, sample_rate)
    }

    /// Load audio from file (WAV via hound, MP3/FLAC/OGG via symphonia)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| AudioError::load(format!(
                "Could not determine file extension of {}",
                path.display()
            )))?;

        match extension.to_lowercase().as_str() {
            "wav" => load_wav(path),
            "mp3" | "flac" | "ogg" => load_with_symphonia(path),
            other => Err(AudioError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    pub fn channel(&self, index: usize) -> ArrayView1<'_, f32> {
        self.samples.row(index)
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.ncols() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Source of waveforms for manifest entries
///
/// Implementations must be shareable across loader threads.
pub trait WaveformLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Waveform>;
}

/// Loads waveforms from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl WaveformLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Waveform> {
        Waveform::load(path)
    }
}

fn load_wav(path: &Path) -> Result<Waveform> {
    let mut reader = WavReader::open(path)
        .map_err(|e| AudioError::load(format!("Failed to open WAV {}: {}", path.display(), e)))?;

    let spec = reader.spec();
    debug!(
        "Loaded WAV {}: {} Hz, {} channels, {} bits",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AudioError::load(format!("Failed to read samples: {}", e)))?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AudioError::load(format!("Failed to read samples: {}", e)))?
        }
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} WAV with {} bits per sample",
                format, bits
            )))
        }
    };

    Waveform::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
}

fn load_with_symphonia(path: &Path) -> Result<Waveform> {
    let file = std::fs::File::open(path)
        .map_err(|e| AudioError::load(format!("Failed to open {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::load(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::load("No audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::load("Could not determine sample rate"))?;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::load(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(AudioError::load(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| AudioError::load(format!("Failed to decode: {}", e)))?;

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    debug!(
        "Loaded {} via symphonia: {} Hz, {} channels",
        path.display(),
        sample_rate,
        channels
    );

    Waveform::from_interleaved(&samples, channels, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                let value = if ch == 0 { 16384 } else { -16384 };
                writer.write_sample((value + i as i32 % 2) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 800);

        let waveform = Waveform::load(&path).unwrap();
        assert_eq!(waveform.channels(), 1);
        assert_eq!(waveform.len(), 800);
        assert_eq!(waveform.sample_rate(), 8000);
        approx::assert_abs_diff_eq!(waveform.samples()[[0, 0]], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_load_keeps_stereo_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 400);

        let waveform = Waveform::load(&path).unwrap();
        assert_eq!(waveform.channels(), 2);
        assert_eq!(waveform.len(), 400);
        assert!(waveform.channel(0)[0] > 0.0);
        assert!(waveform.channel(1)[0] < 0.0);
    }

    #[test]
    fn test_from_interleaved() {
        let waveform = Waveform::from_interleaved(&[0.1, -0.1, 0.2, -0.2], 2, 16000).unwrap();
        assert_eq!(waveform.channel(0).to_vec(), vec![0.1, 0.2]);
        assert_eq!(waveform.channel(1).to_vec(), vec![-0.1, -0.2]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Waveform::load("/tmp/audio.xyz").unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Waveform::load("/nonexistent/clip.wav").unwrap_err();
        assert!(matches!(err, AudioError::LoadError(_)));
    }

    #[test]
    fn test_invalid_waveform() {
        assert!(Waveform::mono(vec![0.0; 10], 0).is_err());
        assert!(Waveform::from_interleaved(&[0.0; 4], 0, 8000).is_err());
    }
}
