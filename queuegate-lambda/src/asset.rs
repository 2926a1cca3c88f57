//! Code assets
//!
//! A function's code directory is fingerprinted and packaged into a zip that
//! the provisioning engine uploads to the bootstrap bucket before deployment.
//! Both the fingerprint and the archive depend only on relative paths and file
//! contents, so the same directory always yields the same object key and bytes.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::function::LambdaError;

/// Bucket created by the account bootstrap, holding file assets
pub const BOOTSTRAP_BUCKET: &str = "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}";

#[derive(Debug, Clone)]
pub struct Asset {
    source: PathBuf,
    /// (archive name, file on disk), sorted by archive name
    files: Vec<(String, PathBuf)>,
    hash: String,
}

impl Asset {
    /// Fingerprint every regular file under `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, LambdaError> {
        let source = dir.as_ref().to_path_buf();
        if !source.is_dir() {
            return Err(LambdaError::AssetNotFound(source));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&source).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&source).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, entry.path().to_path_buf()));
        }
        if files.is_empty() {
            return Err(LambdaError::EmptyAsset(source));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        for (name, path) in &files {
            let data = fs::read(path)?;
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update((data.len() as u64).to_be_bytes());
            hasher.update(&data);
        }
        let hash = hex::encode(hasher.finalize());

        debug!(
            source = %source.display(),
            files = files.len(),
            hash = %hash,
            "Fingerprinted asset"
        );
        Ok(Self {
            source,
            files,
            hash,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Hex SHA-256 fingerprint of the directory
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Archive entry names, sorted
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|(n, _)| n == name)
    }

    /// Object key in the bootstrap bucket
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    /// File name of the packaged archive in the output directory
    pub fn packaged_file_name(&self) -> String {
        format!("asset.{}.zip", self.hash)
    }

    /// Build the zip archive in memory
    pub fn package(&self) -> Result<Vec<u8>, LambdaError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        for (name, path) in &self.files {
            let data = fs::read(path)?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Package into `out_dir`, returning the archive path
    pub fn write_zip(&self, out_dir: &Path) -> Result<PathBuf, LambdaError> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join(self.packaged_file_name());
        fs::write(&path, self.package()?)?;
        debug!(path = %path.display(), "Packaged asset");
        Ok(path)
    }
}
