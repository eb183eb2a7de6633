//! Shared pool of recorded audio files virtual users stream from
//! (spec.md §4.6, grounded in
//! `original_source/services/voice-gateway/tests/load/audio_pool.py`'s
//! `AudioPool`/`AudioFile`).

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use thiserror::Error;

use crate::config::SelectionStrategy;

#[derive(Debug, Error)]
pub enum AudioPoolError {
    #[error("audio directory not found: {0}")]
    DirNotFound(String),
    #[error("no WAV files found in {0}")]
    Empty(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: hound::Error,
    },
}

/// One loaded WAV file, held entirely in memory and re-streamed for every
/// virtual user that picks it.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioFile {
    /// Raw PCM chunks of `chunk_size` bytes, last chunk possibly shorter --
    /// matches `AudioFile.get_chunks`.
    pub fn chunks(&self, chunk_size: usize) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(chunk_size.max(1))
    }
}

/// Loads every `*.wav` file under a directory and hands them out to
/// virtual users per the configured selection strategy.
pub struct AudioPool {
    files: Vec<AudioFile>,
    strategy: SelectionStrategy,
    cursor: AtomicUsize,
}

impl AudioPool {
    pub fn load(dir: &str, strategy: SelectionStrategy) -> Result<Self, AudioPoolError> {
        let path = Path::new(dir);
        if !path.is_dir() {
            return Err(AudioPoolError::DirNotFound(dir.to_string()));
        }

        let mut files = Vec::new();
        let entries = std::fs::read_dir(path)
            .map_err(|_| AudioPoolError::DirNotFound(dir.to_string()))?;
        for entry in entries.flatten() {
            let entry_path = entry.path();
            if entry_path.extension().and_then(|e| e.to_str()) != Some("wav") {
                continue;
            }
            let reader = hound::WavReader::open(&entry_path).map_err(|source| AudioPoolError::Read {
                path: entry_path.display().to_string(),
                source,
            })?;
            let spec = reader.spec();
            let samples: Vec<i16> = reader
                .into_samples::<i16>()
                .filter_map(Result::ok)
                .collect();
            let mut data = Vec::with_capacity(samples.len() * 2);
            for sample in samples {
                data.extend_from_slice(&sample.to_le_bytes());
            }
            files.push(AudioFile {
                name: entry_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                data,
                sample_rate: spec.sample_rate,
            });
        }

        if files.is_empty() {
            return Err(AudioPoolError::Empty(dir.to_string()));
        }

        Ok(Self {
            files,
            strategy,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Build a pool from in-memory synthetic audio, for tests and
    /// environments without a `test_audio/` directory on disk.
    pub fn from_files(files: Vec<AudioFile>, strategy: SelectionStrategy) -> Self {
        Self {
            files,
            strategy,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Select the next audio file per `self.strategy`. Thread-safe: many
    /// virtual users call this concurrently.
    pub fn next(&self) -> &AudioFile {
        let index = match self.strategy {
            SelectionStrategy::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % self.files.len(),
            SelectionStrategy::Sequential => {
                let i = self.cursor.load(Ordering::Relaxed) % self.files.len();
                self.cursor.fetch_add(1, Ordering::Relaxed);
                i
            }
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..self.files.len()),
        };
        &self.files[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<AudioFile> {
        vec![
            AudioFile { name: "a.wav".to_string(), data: vec![0; 8], sample_rate: 16_000 },
            AudioFile { name: "b.wav".to_string(), data: vec![1; 8], sample_rate: 16_000 },
            AudioFile { name: "c.wav".to_string(), data: vec![2; 8], sample_rate: 16_000 },
        ]
    }

    #[test]
    fn round_robin_cycles_through_every_file() {
        let pool = AudioPool::from_files(sample_files(), SelectionStrategy::RoundRobin);
        let picked: Vec<String> = (0..6).map(|_| pool.next().name.clone()).collect();
        assert_eq!(picked, vec!["a.wav", "b.wav", "c.wav", "a.wav", "b.wav", "c.wav"]);
    }

    #[test]
    fn sequential_also_cycles_through_every_file() {
        let pool = AudioPool::from_files(sample_files(), SelectionStrategy::Sequential);
        let picked: Vec<String> = (0..4).map(|_| pool.next().name.clone()).collect();
        assert_eq!(picked, vec!["a.wav", "b.wav", "c.wav", "a.wav"]);
    }

    #[test]
    fn random_always_returns_a_known_file() {
        let pool = AudioPool::from_files(sample_files(), SelectionStrategy::Random);
        let names: std::collections::HashSet<&str> = ["a.wav", "b.wav", "c.wav"].into_iter().collect();
        for _ in 0..20 {
            assert!(names.contains(pool.next().name.as_str()));
        }
    }

    #[test]
    fn chunks_splits_data_into_fixed_size_pieces_with_a_short_final_chunk() {
        let file = AudioFile { name: "a.wav".to_string(), data: vec![0; 10], sample_rate: 16_000 };
        let sizes: Vec<usize> = file.chunks(4).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn load_on_missing_directory_is_an_error() {
        let result = AudioPool::load("/nonexistent/path/for/sure", SelectionStrategy::RoundRobin);
        assert!(matches!(result, Err(AudioPoolError::DirNotFound(_))));
    }
}
