//! Common utility functions shared across CLI commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use image::{ImageFormat, RgbImage};
use pixelproof_core::{
    DetectionConfig, DetectionService, DirectoryArtifactSink, FileDetectionStore, SealingKey,
    XChaChaTileCipher,
};
use rand::RngCore;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Salt file kept next to the detection records.
pub const SALT_FILE: &str = "sealing.salt";

const SALT_SIZE: usize = 16;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub store: PathBuf,
    pub artifacts: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl GlobalOpts {
    /// Whether human-readable output should be printed.
    pub fn human(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Load an image file and convert it to 8-bit RGB.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "Read image");
    Ok(image.to_rgb8())
}

/// Save an image, picking the format from the extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write image: {}", path.display()))?;
    info!(path = %path.display(), "Wrote image");
    Ok(())
}

/// Reject output paths whose format would destroy the LSB plane.
pub fn ensure_lossless(path: &Path) -> Result<ImageFormat> {
    let format = ImageFormat::from_path(path).ok();
    match format {
        Some(f @ (ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff)) => Ok(f),
        _ => bail!(
            "Unsupported output format for {}: watermarked images must be written as png, bmp or tiff",
            path.display()
        ),
    }
}

/// Identifier recorded for an input image: its file name.
pub fn image_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn parse_detection_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .with_context(|| format!("Invalid detection id: {value}"))
}

/// Read the store's KDF salt, creating it on first use.
///
/// Creation goes through a temporary file and a no-clobber rename, so
/// concurrent first runs all end up with the salt that landed first.
pub fn load_or_create_salt(store: &Path) -> Result<Vec<u8>> {
    let path = store.join(SALT_FILE);
    if let Some(salt) = read_salt(&path)? {
        return Ok(salt);
    }

    std::fs::create_dir_all(store)
        .with_context(|| format!("Failed to write store: {}", store.display()))?;
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let tmp = NamedTempFile::new_in(store)
        .and_then(|mut tmp| {
            tmp.write_all(&salt)?;
            tmp.as_file().sync_all()?;
            Ok(tmp)
        })
        .with_context(|| format!("Failed to write salt: {}", path.display()))?;

    match tmp.persist_noclobber(&path) {
        Ok(_) => {
            debug!(path = %path.display(), "Created sealing salt");
            Ok(salt)
        }
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Sealing salt created concurrently, reusing it");
            read_salt(&path)?
                .with_context(|| format!("Failed to read salt: {}", path.display()))
        }
        Err(e) => {
            Err(e.error).with_context(|| format!("Failed to write salt: {}", path.display()))
        }
    }
}

fn read_salt(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(salt) => Ok(Some(salt)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read salt: {}", path.display())),
    }
}

/// Build the detection service over the file store.
///
/// With a passphrase, tiles are sealed with a key derived from it and the
/// store's salt. Without one, the cipher key is throwaway; only use that for
/// commands that never seal or open payloads.
pub fn build_service(opts: &GlobalOpts, passphrase: Option<&str>) -> Result<DetectionService> {
    let config = DetectionConfig::from_env();
    let store = FileDetectionStore::open(&opts.store)
        .with_context(|| format!("Failed to open store: {}", opts.store.display()))?;

    let key = match passphrase {
        Some(passphrase) => {
            let salt = load_or_create_salt(&opts.store)?;
            SealingKey::derive(passphrase.as_bytes(), &salt)?
        }
        None => SealingKey::generate(),
    };

    let mut builder = DetectionService::builder()
        .config(config)
        .store(Arc::new(store))
        .cipher(Arc::new(XChaChaTileCipher::new(key)));

    if let Some(dir) = &opts.artifacts {
        let sink = DirectoryArtifactSink::new(dir)
            .with_context(|| format!("Failed to write artifacts: {}", dir.display()))?;
        builder = builder.artifacts(Arc::new(sink));
    }

    Ok(builder.build()?)
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_lossless() {
        assert_eq!(ensure_lossless(Path::new("a.png")).unwrap(), ImageFormat::Png);
        assert_eq!(ensure_lossless(Path::new("a.BMP")).unwrap(), ImageFormat::Bmp);
        assert!(ensure_lossless(Path::new("a.tif")).is_ok());
        assert!(ensure_lossless(Path::new("a.jpg")).is_err());
        assert!(ensure_lossless(Path::new("a.webp")).is_err());
        assert!(ensure_lossless(Path::new("noext")).is_err());
    }

    #[test]
    fn test_image_id() {
        assert_eq!(image_id(Path::new("/tmp/shots/photo.png")), "photo.png");
    }

    #[test]
    fn test_parse_detection_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_detection_id(&id.to_string()).unwrap(), id);
        assert!(parse_detection_id("not-a-uuid").is_err());
    }

    #[test]
    fn test_salt_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_salt(dir.path()).unwrap();
        let second = load_or_create_salt(dir.path()).unwrap();
        assert_eq!(first.len(), SALT_SIZE);
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_first_runs_share_one_salt() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");

        let salts: Vec<Vec<u8>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| load_or_create_salt(&store).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let on_disk = std::fs::read(store.join(SALT_FILE)).unwrap();
        assert_eq!(on_disk.len(), SALT_SIZE);
        assert!(salts.iter().all(|salt| *salt == on_disk));
    }
}
