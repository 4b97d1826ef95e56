//! Configuration types and loading
//!
//! Each attachment feature (vision images, generic files) is driven by its own
//! [`UploadSettings`]. The application config bundles both with transport and
//! logging settings and is layered as defaults, an optional file, then
//! `CA_`-prefixed environment variables.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::TransferMethod;

/// Image extensions accepted by the vision feature
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// Document extensions accepted by the file feature in addition to images
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "md", "markdown", "csv", "html", "xlsx", "xls", "docx", "pptx", "json",
];

/// Capability descriptor for one attachment feature.
///
/// Mirrors the settings object a configuration panel produces: whether the
/// feature is on, which transfer methods it accepts, which extensions, the
/// per-file size limit and how many attachments a turn may carry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadSettings {
    pub enabled: bool,
    pub allowed_transfer_methods: BTreeSet<TransferMethod>,
    /// Lower-case extensions without the leading dot
    pub allowed_extensions: BTreeSet<String>,
    pub max_size_mib: f64,
    pub max_count: usize,
}

impl UploadSettings {
    /// Settings for image attachments sent to vision-capable models
    pub fn vision() -> Self {
        Self {
            enabled: true,
            allowed_transfer_methods: [TransferMethod::LocalFile, TransferMethod::RemoteUrl]
                .into_iter()
                .collect(),
            allowed_extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_size_mib: 10.0,
            max_count: 3,
        }
    }

    /// Settings for generic file attachments
    pub fn files() -> Self {
        Self {
            enabled: true,
            allowed_transfer_methods: [TransferMethod::LocalFile, TransferMethod::RemoteUrl]
                .into_iter()
                .collect(),
            allowed_extensions: IMAGE_EXTENSIONS
                .iter()
                .chain(DOCUMENT_EXTENSIONS)
                .map(|e| e.to_string())
                .collect(),
            max_size_mib: 15.0,
            max_count: 6,
        }
    }

    pub fn with_transfer_methods(mut self, methods: &[TransferMethod]) -> Self {
        self.allowed_transfer_methods = methods.iter().copied().collect();
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.allowed_extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_max_size_mib(mut self, max_size_mib: f64) -> Self {
        self.max_size_mib = max_size_mib;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn allows(&self, method: TransferMethod) -> bool {
        self.allowed_transfer_methods.contains(&method)
    }

    /// Case-insensitive extension check
    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.to_lowercase() == extension)
    }

    /// Size limit in bytes
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mib * 1024.0 * 1024.0) as u64
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if !(self.max_size_mib > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.max_size_mib", key),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.enabled && self.allowed_transfer_methods.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.allowed_transfer_methods", key),
                message: "an enabled feature needs at least one transfer method".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the bundled disk transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Directory uploaded payloads are written to
    pub storage_dir: String,
    /// Bytes written between two progress reports
    pub chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            storage_dir: std::env::temp_dir()
                .join("chat-attachments")
                .to_string_lossy()
                .into_owned(),
            chunk_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,ca_attachments=debug".to_string(),
            json: false,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Image attachments
    pub vision: UploadSettings,
    /// Generic file attachments
    pub files: UploadSettings,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vision: UploadSettings::vision(),
            files: UploadSettings::files(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config source error: {0}")]
    Source(#[from] ::config::ConfigError),
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment keys use the `CA_` prefix and `__` as the nesting
    /// separator, e.g. `CA_FILES__MAX_COUNT=4`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(::config::File::from(path));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("CA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vision.validate("vision")?;
        self.files.validate("files")?;
        if self.transport.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "transport.chunk_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
