//! Manifest-driven CTC dataset
//!
//! `get(index)` loads the audio for a manifest row, encodes its transcript,
//! extracts (and for training, masks) the log-mel spectrogram and checks the
//! invariants the CTC loss depends on. A sample that fails to load or breaks
//! an invariant is replaced by a neighboring one, within a fixed budget.

use ctcprep_audio::{
    resample, Augmenter, FeatureExtractor, FileLoader, Waveform, WaveformLoader,
};
use ndarray::Array3;
use rand::Rng;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::error::{DataError, Result, SampleRejection};
use crate::manifest::Manifest;
use crate::text::TextCodec;

/// Temporal downsampling of the model; input lengths are frames divided by this
pub const TIME_DOWNSAMPLING: usize = 2;

/// One validated training example
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Shape (channel, n_mels, frames)
    pub spectrogram: Array3<f32>,
    pub label: Vec<usize>,
    /// Model output length, `frames / 2`
    pub spec_len: usize,
    pub label_len: usize,
}

impl Sample {
    /// Build a sample, deriving both lengths
    pub fn new(spectrogram: Array3<f32>, label: Vec<usize>) -> Self {
        let spec_len = spectrogram.shape()[2] / TIME_DOWNSAMPLING;
        let label_len = label.len();
        Self {
            spectrogram,
            label,
            spec_len,
            label_len,
        }
    }

    pub fn channels(&self) -> usize {
        self.spectrogram.shape()[0]
    }

    pub fn n_mels(&self) -> usize {
        self.spectrogram.shape()[1]
    }

    pub fn frames(&self) -> usize {
        self.spectrogram.shape()[2]
    }

    /// Check the CTC invariants, first failure wins
    pub fn check(&self, max_frames: usize) -> std::result::Result<(), SampleRejection> {
        if self.channels() != 1 {
            return Err(SampleRejection::MultiChannel(self.channels()));
        }
        if self.spec_len < self.label_len {
            return Err(SampleRejection::SpectrogramTooShort {
                spec_len: self.spec_len,
                label_len: self.label_len,
            });
        }
        if self.frames() > max_frames {
            return Err(SampleRejection::TooManyFrames {
                frames: self.frames(),
                max_frames,
            });
        }
        if self.label_len == 0 {
            return Err(SampleRejection::EmptyLabel);
        }
        Ok(())
    }
}

/// Indices tried for a fetch starting at `start`
///
/// Walks down to 0, stepping up to 1 only when starting at 0. The walk
/// never revisits an index, so it ends on its own.
fn neighbor_walk(start: usize) -> impl Iterator<Item = usize> {
    (0..=start).rev().chain((start == 0).then_some(1))
}

/// Dataset of validated samples over a manifest
pub struct SampleSource<L: WaveformLoader = FileLoader> {
    manifest: Manifest,
    codec: TextCodec,
    extractor: FeatureExtractor,
    /// `None` for validation data
    augmenter: Option<Augmenter>,
    loader: L,
    max_frames: usize,
    max_retries: usize,
    log_failures: bool,
    resample: bool,
}

impl SampleSource<FileLoader> {
    /// Dataset reading audio from disk
    ///
    /// `valid` disables augmentation.
    pub fn new(manifest: Manifest, config: &DataConfig, valid: bool) -> Result<Self> {
        Self::with_loader(manifest, config, valid, FileLoader)
    }

    pub fn from_manifest_path<P: AsRef<Path>>(
        path: P,
        config: &DataConfig,
        valid: bool,
    ) -> Result<Self> {
        Self::new(Manifest::from_path(path)?, config, valid)
    }
}

impl<L: WaveformLoader> SampleSource<L> {
    pub fn with_loader(manifest: Manifest, config: &DataConfig, valid: bool, loader: L) -> Result<Self> {
        config.validate()?;

        let codec = TextCodec::new();
        if config.check_alphabet_on_load {
            for utterance in manifest.iter() {
                codec.encode(&utterance.text)?;
            }
        }

        let extractor = FeatureExtractor::new(config.feature_config())?;
        let augmenter = if valid {
            None
        } else {
            Some(Augmenter::new(config.augment_config())?)
        };

        info!(
            "Dataset ready: {} entries, {} mel bins, augmentation {}",
            manifest.len(),
            config.n_feats,
            if valid { "off" } else { "on" }
        );

        Ok(Self {
            manifest,
            codec,
            extractor,
            augmenter,
            loader,
            max_frames: config.max_frames,
            max_retries: config.max_retries,
            log_failures: config.log_failures,
            resample: config.resample,
        })
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn is_training(&self) -> bool {
        self.augmenter.is_some()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Fetch a valid sample at `index` or a neighbor of it
    ///
    /// Augmentation draws from the calling thread's RNG.
    pub fn get(&self, index: usize) -> Result<Sample> {
        self.get_with_rng(index, &mut rand::thread_rng())
    }

    /// [`get`](Self::get) with an explicit random source
    ///
    /// Load failures and invariant violations move on to the next neighbor.
    /// Unknown characters fail immediately. When the neighbors or the retry
    /// budget run out, returns [`DataError::Exhausted`].
    pub fn get_with_rng<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let len = self.len();
        if index >= len {
            return Err(DataError::IndexOutOfRange { index, len });
        }

        let mut attempts = 0;
        for candidate in neighbor_walk(index)
            .filter(|&i| i < len)
            .take(self.max_retries)
        {
            attempts += 1;
            match self.try_get(candidate, rng) {
                Ok(sample) => {
                    if candidate != index {
                        debug!("Sample {} replaced by neighbor {}", index, candidate);
                    }
                    return Ok(sample);
                }
                Err(e) if e.is_recoverable() => {
                    if self.log_failures {
                        let key = self.manifest.get(candidate).map(|u| u.key.display().to_string());
                        warn!("Skipping sample {} ({}): {}", candidate, key.unwrap_or_default(), e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(DataError::Exhausted { index, attempts })
    }

    /// Single fetch of `index` with no neighbor fallback
    pub fn try_get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let utterance = self.manifest.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let waveform = self.load_waveform(&utterance.key)?;
        let label = self.codec.encode(&utterance.text)?;

        let mut spectrogram = self.extractor.extract(&waveform)?;
        if let Some(augmenter) = &self.augmenter {
            augmenter.apply(&mut spectrogram, rng);
        }

        let sample = Sample::new(spectrogram, label);
        sample
            .check(self.max_frames)
            .map_err(|reason| DataError::Rejected { index, reason })?;

        debug!(
            "Sample {}: spectrogram {:?}, spec_len {}, label_len {}",
            index,
            sample.spectrogram.shape(),
            sample.spec_len,
            sample.label_len
        );
        Ok(sample)
    }

    fn load_waveform(&self, path: &Path) -> Result<Waveform> {
        let waveform = self.loader.load(path)?;
        let target_rate = self.extractor.config().sample_rate;
        if self.resample && waveform.sample_rate() != target_rate {
            return Ok(resample(&waveform, target_rate)?);
        }
        Ok(waveform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Utterance;
    use ctcprep_audio::AudioError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory loader: path -> (channels, samples); unknown paths fail
    struct MemoryLoader {
        clips: HashMap<PathBuf, (usize, usize)>,
        sample_rate: u32,
        loads: AtomicUsize,
    }

    impl MemoryLoader {
        fn new(clips: &[(&str, usize, usize)]) -> Self {
            Self {
                clips: clips
                    .iter()
                    .map(|&(key, channels, len)| (PathBuf::from(key), (channels, len)))
                    .collect(),
                sample_rate: 8000,
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl WaveformLoader for MemoryLoader {
        fn load(&self, path: &Path) -> ctcprep_audio::Result<Waveform> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let &(channels, len) = self
                .clips
                .get(path)
                .ok_or_else(|| AudioError::load(format!("missing {}", path.display())))?;
            let interleaved: Vec<f32> = (0..len * channels)
                .map(|i| ((i / channels) as f32 * 0.3).sin() * 0.5)
                .collect();
            Waveform::from_interleaved(&interleaved, channels, self.sample_rate)
        }
    }

    fn config() -> DataConfig {
        DataConfig {
            log_failures: false,
            ..DataConfig::default()
        }
    }

    fn source(rows: &[(&str, &str)], clips: &[(&str, usize, usize)]) -> SampleSource<MemoryLoader> {
        let manifest = Manifest::new(rows.iter().map(|&(k, t)| Utterance::new(k, t)).collect());
        SampleSource::with_loader(manifest, &config(), true, MemoryLoader::new(clips)).unwrap()
    }

    #[test]
    fn test_valid_sample() {
        // 3120 samples at hop 80 -> 40 frames
        let ds = source(&[("cat.wav", "cat")], &[("cat.wav", 1, 3120)]);
        let sample = ds.get(0).unwrap();

        assert_eq!(sample.label, TextCodec::new().encode("cat").unwrap());
        assert_eq!(sample.label_len, 3);
        assert_eq!(sample.spec_len, 20);
        assert_eq!(sample.spectrogram.shape(), &[1, 81, 40]);
    }

    #[test]
    fn test_resample_to_feature_rate() {
        // 6240 samples at 16 kHz -> 3120 at 8 kHz -> 40 frames
        let manifest = Manifest::new(vec![Utterance::new("wide.wav", "cat")]);
        let config = DataConfig {
            resample: true,
            ..config()
        };
        let loader = MemoryLoader {
            sample_rate: 16000,
            ..MemoryLoader::new(&[("wide.wav", 1, 6240)])
        };
        let ds = SampleSource::with_loader(manifest, &config, true, loader).unwrap();

        let sample = ds.get(0).unwrap();
        assert_eq!(sample.spectrogram.shape(), &[1, 81, 40]);
        assert_eq!(sample.spec_len, 20);
    }

    #[test]
    fn test_rate_mismatch_kept_without_resample() {
        let manifest = Manifest::new(vec![Utterance::new("wide.wav", "cat")]);
        let loader = MemoryLoader {
            sample_rate: 16000,
            ..MemoryLoader::new(&[("wide.wav", 1, 6240)])
        };
        let ds = SampleSource::with_loader(manifest, &config(), true, loader).unwrap();

        assert_eq!(ds.get(0).unwrap().spectrogram.shape(), &[1, 81, 79]);
    }

    #[test]
    fn test_stereo_falls_back_to_previous() {
        let ds = source(
            &[("a.wav", "a"), ("b.wav", "b")],
            &[("a.wav", 1, 1600), ("b.wav", 2, 1600)],
        );
        let sample = ds.get(1).unwrap();
        assert_eq!(sample.label, vec![2]);
    }

    #[test]
    fn test_index_zero_falls_forward() {
        let ds = source(
            &[("missing.wav", "a"), ("b.wav", "b")],
            &[("b.wav", 1, 1600)],
        );
        assert_eq!(ds.get(0).unwrap().label, vec![3]);
    }

    #[test]
    fn test_label_longer_than_spectrogram() {
        // 400 samples -> 6 frames -> spec_len 3
        let ds = source(&[("short.wav", "abcd")], &[("short.wav", 1, 400)]);
        let err = ds.try_get(0, &mut rand::thread_rng()).unwrap_err();
        assert!(matches!(
            err,
            DataError::Rejected {
                reason: SampleRejection::SpectrogramTooShort { spec_len: 3, label_len: 4 },
                ..
            }
        ));
    }

    #[test]
    fn test_empty_transcript_rejected() {
        let ds = source(&[("a.wav", "")], &[("a.wav", 1, 1600)]);
        let err = ds.try_get(0, &mut rand::thread_rng()).unwrap_err();
        assert!(matches!(
            err,
            DataError::Rejected { reason: SampleRejection::EmptyLabel, .. }
        ));
    }

    #[test]
    fn test_too_many_frames_rejected() {
        let manifest = Manifest::new(vec![Utterance::new("long.wav", "a")]);
        let config = DataConfig {
            max_frames: 10,
            log_failures: false,
            ..DataConfig::default()
        };
        let ds = SampleSource::with_loader(
            manifest,
            &config,
            true,
            MemoryLoader::new(&[("long.wav", 1, 1600)]),
        )
        .unwrap();

        let err = ds.try_get(0, &mut rand::thread_rng()).unwrap_err();
        assert!(matches!(
            err,
            DataError::Rejected {
                reason: SampleRejection::TooManyFrames { frames: 21, max_frames: 10 },
                ..
            }
        ));
    }

    #[test]
    fn test_single_bad_entry_is_bounded() {
        let ds = source(&[("bad.wav", "a")], &[("bad.wav", 2, 1600)]);
        match ds.get(0) {
            Err(DataError::Exhausted { index, attempts }) => {
                assert_eq!(index, 0);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_budget_caps_attempts() {
        let rows: Vec<(String, String)> = (0..100)
            .map(|i| (format!("{}.wav", i), "a".to_string()))
            .collect();
        let manifest = Manifest::new(rows.iter().map(|(k, t)| Utterance::new(k.as_str(), t.as_str())).collect());
        let config = DataConfig {
            max_retries: 5,
            log_failures: false,
            ..DataConfig::default()
        };
        let loader = MemoryLoader::new(&[]);
        let ds = SampleSource::with_loader(manifest, &config, true, loader).unwrap();

        assert!(matches!(
            ds.get(99),
            Err(DataError::Exhausted { index: 99, attempts: 5 })
        ));
        assert_eq!(ds.loader.loads.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_unknown_character_not_retried() {
        let ds = source(
            &[("a.wav", "a"), ("b.wav", "b#")],
            &[("a.wav", 1, 1600), ("b.wav", 1, 1600)],
        );
        assert!(matches!(
            ds.get(1),
            Err(DataError::UnknownCharacter { ch: '#', position: 1 })
        ));
    }

    #[test]
    fn test_alphabet_checked_on_load() {
        let manifest = Manifest::new(vec![Utterance::new("a.wav", "Hello")]);
        let config = DataConfig {
            check_alphabet_on_load: true,
            ..DataConfig::default()
        };
        let result = SampleSource::with_loader(manifest, &config, true, MemoryLoader::new(&[]));
        assert!(matches!(result, Err(DataError::UnknownCharacter { ch: 'H', .. })));
    }

    #[test]
    fn test_out_of_range() {
        let ds = source(&[("a.wav", "a")], &[("a.wav", 1, 1600)]);
        assert!(matches!(
            ds.get(3),
            Err(DataError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_training_source_augments() {
        let manifest = Manifest::new(vec![Utterance::new("a.wav", "a")]);
        let config = DataConfig {
            specaug_rate: 1.0,
            log_failures: false,
            ..DataConfig::default()
        };
        let clips = [("a.wav", 1, 8000)];
        let train =
            SampleSource::with_loader(manifest.clone(), &config, false, MemoryLoader::new(&clips)).unwrap();
        let valid = SampleSource::with_loader(manifest, &config, true, MemoryLoader::new(&clips)).unwrap();
        assert!(train.is_training());
        assert!(!valid.is_training());

        let clean = valid.get(0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let masked_any = (0..10).any(|_| train.get_with_rng(0, &mut rng).unwrap() != clean);
        assert!(masked_any);
        // validation output never changes
        assert_eq!(valid.get(0).unwrap(), clean);
    }

    #[test]
    fn test_neighbor_walk() {
        assert_eq!(neighbor_walk(0).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(neighbor_walk(3).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_sample_check_order() {
        let sample = Sample::new(Array3::zeros((2, 4, 2)), vec![1, 2, 3]);
        assert_eq!(sample.check(100), Err(SampleRejection::MultiChannel(2)));
        let sample = Sample::new(Array3::zeros((1, 4, 40)), vec![2; 3]);
        assert_eq!(sample.check(40), Ok(()));
        assert_eq!(
            sample.check(39),
            Err(SampleRejection::TooManyFrames { frames: 40, max_frames: 39 })
        );
    }
}
