//! Audio asset loading.
//!
//! Samples and keyboards are fetched through an [`AssetLibrary`] before any
//! scheduler touches them; the scheduling core itself never performs I/O.
//! A failed load surfaces to the caller, who may retry by calling again; the
//! core is simply not updated until a load succeeds.

use crate::audio::SampleBuffer;
use rayon::prelude::*;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

/// Identifier of a downloadable sample or keyboard asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(Uuid);

impl AssetId {
    /// Mints a fresh random asset ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An ordered list of playable pitches, each backed by one buffer.
#[derive(Debug, Clone)]
pub struct Keyboard {
    /// Display name of the keyboard.
    pub name: String,

    buffers: Vec<SampleBuffer>,
}

impl Keyboard {
    pub fn new(name: impl Into<String>, buffers: Vec<SampleBuffer>) -> Self {
        Self {
            name: name.into(),
            buffers,
        }
    }

    /// Number of playable pitches.
    pub fn pitch_count(&self) -> usize {
        self.buffers.len()
    }

    /// Buffer for `pitch`, lowest first; `None` when out of range.
    pub fn buffer(&self, pitch: usize) -> Option<&SampleBuffer> {
        self.buffers.get(pitch)
    }
}

/// Errors surfaced by asset loading.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read asset")]
    Io(#[from] std::io::Error),

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("malformed keyboard manifest")]
    Manifest(#[from] serde_json::Error),
}

/// The asset collaborator consumed by the document/engine layer.
///
/// Loading happens strictly before a scheduler is constructed or content is
/// swapped in, so implementations are free to block.
pub trait AssetLibrary {
    /// Loads one sample buffer.
    fn load_sample(&self, id: AssetId) -> Result<SampleBuffer, AssetError>;

    /// Loads a keyboard: an ordered list of per-pitch buffers plus a name.
    fn load_keyboard(&self, id: AssetId) -> Result<Keyboard, AssetError>;
}

/// On-disk keyboard manifest: `keyboards/<id>/manifest.json`.
#[derive(Debug, Deserialize)]
struct KeyboardManifest {
    name: String,
    /// Wav filenames relative to the manifest, ordered lowest pitch first.
    pitches: Vec<String>,
}

/// Filesystem-backed asset library.
///
/// Samples live at `<root>/samples/<id>.wav`; keyboards at
/// `<root>/keyboards/<id>/manifest.json` with per-pitch wavs alongside.
pub struct FsAssetLibrary {
    root: PathBuf,
}

impl FsAssetLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn decode_wav(path: &Path) -> Result<SampleBuffer, AssetError> {
        if !path.exists() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }
        let mut reader =
            hound::WavReader::open(path).map_err(|e| AssetError::Decode(e.to_string()))?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| AssetError::Decode(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| AssetError::Decode(e.to_string()))?
            }
        };
        debug!(path = %path.display(), frames = samples.len() / spec.channels as usize, "decoded wav");
        Ok(SampleBuffer::new(samples, spec.channels, spec.sample_rate))
    }
}

impl AssetLibrary for FsAssetLibrary {
    fn load_sample(&self, id: AssetId) -> Result<SampleBuffer, AssetError> {
        let path = self.root.join("samples").join(format!("{id}.wav"));
        Self::decode_wav(&path).inspect_err(|e| error!(%id, error = %e, "sample load failed"))
    }

    fn load_keyboard(&self, id: AssetId) -> Result<Keyboard, AssetError> {
        let dir = self.root.join("keyboards").join(id.to_string());
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.exists() {
            return Err(AssetError::NotFound(manifest_path));
        }
        let manifest: KeyboardManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;

        // Pitch buffers are independent; decode them in parallel and keep
        // manifest order.
        let buffers: Result<Vec<SampleBuffer>, AssetError> = manifest
            .pitches
            .par_iter()
            .map(|file| Self::decode_wav(&dir.join(file)))
            .collect();
        let buffers = buffers.inspect_err(|e| error!(%id, error = %e, "keyboard load failed"))?;
        debug!(%id, name = %manifest.name, pitches = buffers.len(), "loaded keyboard");
        Ok(Keyboard::new(manifest.name, buffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unique scratch directory under the system temp dir.
    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("loopdeck-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn missing_sample_is_not_found() {
        let library = FsAssetLibrary::new(scratch_dir());
        let err = library.load_sample(AssetId::random()).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[test]
    fn sample_round_trips_through_wav() {
        let root = scratch_dir();
        std::fs::create_dir_all(root.join("samples")).unwrap();
        let id = AssetId::random();
        write_wav(&root.join("samples").join(format!("{id}.wav")), 512);

        let library = FsAssetLibrary::new(&root);
        let buffer = library.load_sample(id).unwrap();
        assert_eq!(buffer.frames(), 512);
        assert_eq!(buffer.sample_rate(), 44_100);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn keyboard_loads_pitches_in_manifest_order() {
        let root = scratch_dir();
        let id = AssetId::random();
        let dir = root.join("keyboards").join(id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        write_wav(&dir.join("c3.wav"), 100);
        write_wav(&dir.join("d3.wav"), 200);
        std::fs::write(
            dir.join("manifest.json"),
            r#"{ "name": "tiny piano", "pitches": ["c3.wav", "d3.wav"] }"#,
        )
        .unwrap();

        let library = FsAssetLibrary::new(&root);
        let keyboard = library.load_keyboard(id).unwrap();
        assert_eq!(keyboard.name, "tiny piano");
        assert_eq!(keyboard.pitch_count(), 2);
        assert_eq!(keyboard.buffer(0).unwrap().frames(), 100);
        assert_eq!(keyboard.buffer(1).unwrap().frames(), 200);
        assert!(keyboard.buffer(2).is_none());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn keyboard_with_missing_pitch_fails() {
        let root = scratch_dir();
        let id = AssetId::random();
        let dir = root.join("keyboards").join(id.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            r#"{ "name": "broken", "pitches": ["missing.wav"] }"#,
        )
        .unwrap();

        let library = FsAssetLibrary::new(&root);
        assert!(matches!(
            library.load_keyboard(id),
            Err(AssetError::NotFound(_))
        ));
        std::fs::remove_dir_all(&root).ok();
    }
}
