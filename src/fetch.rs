//! Engine archive download
//!
//! HTTP(S) downloads go through a blocking `reqwest` client with a total and
//! a connect timeout. Transient failures (connection errors, timeouts, 5xx)
//! are retried with exponential backoff; 4xx responses mean the release asset
//! moved or was removed and fail immediately. `file://` URLs are copied from
//! disk so mirrored or offline archives go through the same digest checks.
//!
//! Bytes are streamed into `<dest>.partial` and renamed into place only
//! after the transfer (and the optional sha256 pin) succeeded.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::FetchPolicy;
use crate::error::{ProvisionError, Result};

/// A successfully downloaded archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex sha256 of the archive
    pub sha256: String,
    /// Number of attempts used (1 for file sources)
    pub attempts: u32,
}

enum AttemptError {
    Retryable(String),
    Fatal(String),
}

/// Writer adapter that hashes and counts everything passing through it
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(mut self) -> io::Result<(u64, String)> {
        self.inner.flush()?;
        Ok((self.bytes, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Lowercase hex sha256 of a file on disk
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Downloads engine archives according to a [`FetchPolicy`]
pub struct ArchiveFetcher {
    client: reqwest::blocking::Client,
    policy: FetchPolicy,
}

impl ArchiveFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout())
            .connect_timeout(policy.connect_timeout())
            .user_agent(concat!("engine-provisioner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::fetch(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, policy })
    }

    /// Fetch `url` into `dest`, verifying `expected_sha256` when given.
    ///
    /// On failure no file is left at `dest` or at its `.partial` sibling.
    pub fn fetch(&self, url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<FetchOutcome> {
        let partial = partial_path(dest);

        let result = if let Some(local) = url.strip_prefix("file://") {
            self.copy_local(Path::new(local), &partial)
                .map(|(bytes, sha256)| (bytes, sha256, 1))
        } else {
            self.download_with_retries(url, &partial)
        };

        let (bytes, sha256, attempts) = match result {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        if let Some(expected) = expected_sha256 {
            if !expected.eq_ignore_ascii_case(&sha256) {
                let _ = fs::remove_file(&partial);
                return Err(ProvisionError::fetch(format!(
                    "sha256 mismatch for {}: expected {}, got {}",
                    url,
                    expected.to_ascii_lowercase(),
                    sha256
                )));
            }
            debug!(%sha256, "archive digest matches pin");
        }

        fs::rename(&partial, dest).map_err(|e| {
            let _ = fs::remove_file(&partial);
            ProvisionError::fetch(format!("cannot move download into {}: {}", dest.display(), e))
        })?;

        info!(%url, bytes, attempts, "engine archive fetched");
        Ok(FetchOutcome {
            path: dest.to_path_buf(),
            bytes,
            sha256,
            attempts,
        })
    }

    fn copy_local(&self, source: &Path, partial: &Path) -> Result<(u64, String)> {
        let mut input = File::open(source).map_err(|e| {
            ProvisionError::fetch(format!("cannot open {}: {}", source.display(), e))
        })?;
        let output = File::create(partial).map_err(|e| {
            ProvisionError::fetch(format!("cannot create {}: {}", partial.display(), e))
        })?;

        let mut writer = HashingWriter::new(output);
        io::copy(&mut input, &mut writer)
            .and_then(|_| writer.finish())
            .map_err(|e| ProvisionError::fetch(format!("cannot copy {}: {}", source.display(), e)))
    }

    fn download_with_retries(&self, url: &str, partial: &Path) -> Result<(u64, String, u32)> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(%url, attempt, attempts, "downloading engine archive");
            match self.download_once(url, partial) {
                Ok((bytes, sha256)) => return Ok((bytes, sha256, attempt)),
                Err(AttemptError::Fatal(msg)) => {
                    return Err(ProvisionError::fetch(format!("{}: {}", url, msg)));
                }
                Err(AttemptError::Retryable(msg)) => {
                    last_error = msg;
                    if attempt < attempts {
                        let delay = self.policy.backoff_for(attempt);
                        warn!(
                            %url,
                            attempt,
                            error = %last_error,
                            delay_ms = delay.as_millis() as u64,
                            "download failed, retrying"
                        );
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        Err(ProvisionError::fetch(format!(
            "{} unreachable after {} attempt(s): {}",
            url, attempts, last_error
        )))
    }

    fn download_once(&self, url: &str, partial: &Path) -> std::result::Result<(u64, String), AttemptError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AttemptError::Fatal(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(AttemptError::Retryable(format!("HTTP {}", status)));
        }

        let output = File::create(partial).map_err(|e| {
            AttemptError::Fatal(format!("cannot create {}: {}", partial.display(), e))
        })?;
        let mut writer = HashingWriter::new(output);
        response
            .copy_to(&mut writer)
            .map_err(|e| AttemptError::Retryable(format!("transfer interrupted: {}", e)))?;
        writer
            .finish()
            .map_err(|e| AttemptError::Fatal(format!("cannot write {}: {}", partial.display(), e)))
    }
}
