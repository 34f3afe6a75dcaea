//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across the
//! serving process and the sweep worker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where the unit store and the blobs live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path.  `None` uses [`AppPaths::database_file`].
    pub database_path: Option<PathBuf>,
    /// Root directory of the local blob store.  `None` uses
    /// [`AppPaths::blobs_dir`].
    pub blob_root: Option<PathBuf>,
    /// Base URL of a remote object store (e.g. `https://bucket.example.com`).
    ///
    /// When set, new blobs are written there with HTTP `PUT`; when `None`
    /// everything stays on the local filesystem.  Remote references are
    /// always readable regardless of this setting.
    pub remote_base_url: Option<String>,
    /// Seconds to wait for a remote fetch or upload.
    pub remote_timeout_secs: Option<u64>,
}

impl StorageConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| AppPaths::new().database_file)
    }

    /// Resolved local blob root.
    pub fn blob_root(&self) -> PathBuf {
        self.blob_root
            .clone()
            .unwrap_or_else(|| AppPaths::new().blobs_dir)
    }

    /// Remote request timeout (30 s when unset).
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.unwrap_or(30))
    }
}

// ---------------------------------------------------------------------------
// DispatcherConfig
// ---------------------------------------------------------------------------

/// Settings for the in-process dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of generations running at once in this process.
    pub concurrency: usize,
    /// Pages past the current reading position that are generated ahead.
    pub lookahead: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            lookahead: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// ClaimConfig
// ---------------------------------------------------------------------------

/// Settings for generation claims held in the unit store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    /// A claim older than this is considered abandoned by a crashed worker
    /// and may be taken over.
    pub stale_after_secs: u64,
}

impl ClaimConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationConfig
// ---------------------------------------------------------------------------

/// Settings for a single page generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on fetch + extract + synthesize + store for one page.
    /// Must stay below [`ClaimConfig::stale_after_secs`]; checked by
    /// [`AppConfig::validate`].
    pub timeout_secs: u64,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

// ---------------------------------------------------------------------------
// SynthesisBackend / SynthesisConfig
// ---------------------------------------------------------------------------

/// Selects which speech back-end voices the pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SynthesisBackend {
    /// HTTP endpoint that accepts `{text, lang, slow}` and answers with audio.
    Http,
    /// Local command (e.g. `espeak-ng`) that reads text on stdin and writes
    /// audio on stdout.
    Command,
}

impl Default for SynthesisBackend {
    fn default() -> Self {
        Self::Http
    }
}

/// Settings for the speech synthesis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Which backend to use.
    pub backend: SynthesisBackend,
    /// Full URL of the synthesis endpoint (HTTP backend).
    pub endpoint: String,
    /// Bearer token — `None` for unauthenticated local services.
    pub api_key: Option<String>,
    /// Program and arguments for the command backend.  `{lang}` in any
    /// argument is replaced by the document language code.
    pub command: Vec<String>,
    /// Ask the backend for slower speech.
    pub slow: bool,
    /// File extension of the produced audio.
    pub audio_extension: String,
    /// Maximum seconds to wait for one synthesis call.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: SynthesisBackend::default(),
            endpoint: "http://localhost:5002/api/tts".into(),
            api_key: None,
            command: vec![
                "espeak-ng".into(),
                "-v".into(),
                "{lang}".into(),
                "--stdout".into(),
            ],
            slow: false,
            audio_extension: "mp3".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use misojo::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database and blob locations.
    pub storage: StorageConfig,
    /// In-process dispatcher settings.
    pub dispatcher: DispatcherConfig,
    /// Claim staleness settings.
    pub claims: ClaimConfig,
    /// Per-page generation limits.
    pub generation: GenerationConfig,
    /// Speech back-end settings.
    pub synthesis: SynthesisConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which a running generation could have its
    /// claim taken over.
    pub fn validate(&self) -> Result<()> {
        if self.generation.timeout() >= self.claims.stale_after() {
            bail!(
                "generation.timeout_secs ({}) must be below claims.stale_after_secs ({})",
                self.generation.timeout_secs,
                self.claims.stale_after_secs
            );
        }
        if self.dispatcher.concurrency == 0 {
            log::warn!("config: dispatcher.concurrency = 0, using 1");
        }
        Ok(())
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
