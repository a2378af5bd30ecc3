use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

const APP_DIR: &str = "FaceStress";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to store model at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory holding downloaded detector models, one file per model name.
#[derive(Clone, Debug)]
pub struct ModelCache {
    dir: PathBuf,
}

impl ModelCache {
    /// `<cache_dir>/FaceStress/models`, e.g. `~/.cache/FaceStress/models`.
    pub fn user() -> Result<Self, ModelResolveError> {
        dirs::cache_dir()
            .map(|d| Self::at(d.join(APP_DIR).join("models")))
            .ok_or(ModelResolveError::NoCacheDir)
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `name` in the cache, downloading it from `url` on first use.
    ///
    /// `progress` receives `(bytes_downloaded, total_bytes)`; `total_bytes`
    /// is 0 when the server sends no Content-Length.
    pub fn resolve(
        &self,
        name: &str,
        url: &str,
        progress: impl Fn(u64, u64),
    ) -> Result<PathBuf, ModelResolveError> {
        let path = self.dir.join(name);
        if path.is_file() {
            return Ok(path);
        }

        fs::create_dir_all(&self.dir).map_err(|source| ModelResolveError::CacheDir {
            path: self.dir.clone(),
            source,
        })?;
        log::info!("Downloading {name} from {url}");
        fetch(url, &path, progress)?;
        Ok(path)
    }
}

/// Streams `url` into a temporary file next to `dest` and renames it into
/// place once complete. A failed download leaves nothing behind.
fn fetch(url: &str, dest: &Path, progress: impl Fn(u64, u64)) -> Result<(), ModelResolveError> {
    let write_err = |source| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source,
    };
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;
    let total = response.content_length().unwrap_or(0);

    let mut partial = NamedTempFile::new_in(dir).map_err(write_err)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut downloaded = 0u64;
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        partial.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        progress(downloaded, total);
    }
    partial.flush().map_err(write_err)?;
    partial.persist(dest).map_err(|e| write_err(e.error))?;
    Ok(())
}
