use crate::artifacts::{ArtifactSpec, DatasetBundle};
use crate::error::FetchError;
use harness_core::{ensure_dir, temp_sibling};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

/// Materializes remote artifacts into the local cache, at most once per path.
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        // Large dataset files; only the connect phase is bounded.
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|source| FetchError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    pub fn ensure(&self, artifact: &ArtifactSpec) -> Result<FetchOutcome, FetchError> {
        let dst = artifact.local_path();
        if dst.exists() {
            info!(
                artifact = %artifact.logical_name,
                path = %dst.display(),
                "already present, skipping download"
            );
            return Ok(FetchOutcome::AlreadyPresent);
        }
        ensure_dir(&artifact.local_dir).map_err(|source| FetchError::Io {
            path: artifact.local_dir.clone(),
            source,
        })?;
        info!(url = %artifact.remote_url, path = %dst.display(), "downloading");
        let started = Instant::now();
        let tmp = temp_sibling(&dst, "part");
        let result = self
            .download_to(&artifact.remote_url, &tmp)
            .and_then(|bytes| {
                fs::rename(&tmp, &dst).map_err(|source| FetchError::Io {
                    path: dst.clone(),
                    source,
                })?;
                Ok(bytes)
            });
        match result {
            Ok(bytes) => {
                info!(
                    path = %dst.display(),
                    bytes,
                    secs = started.elapsed().as_secs_f64(),
                    "download complete"
                );
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                Err(err)
            }
        }
    }

    /// Fetches every distinct physical file of the bundle.
    pub fn ensure_bundle(&self, bundle: &DatasetBundle) -> Result<Vec<FetchOutcome>, FetchError> {
        bundle
            .distinct()
            .into_iter()
            .map(|artifact| self.ensure(artifact))
            .collect()
    }

    fn download_to(&self, url: &str, tmp: &Path) -> Result<u64, FetchError> {
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let io_err = |source| FetchError::Io {
            path: tmp.to_path_buf(),
            source,
        };
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;
        let mut file = fs::File::create(tmp).map_err(io_err)?;
        let bytes = response.copy_to(&mut file).map_err(http_err)?;
        file.flush().map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(bytes)
    }
}
