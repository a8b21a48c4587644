//! Document sources and per-load configuration

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Engine load options, merged from viewer-wide settings and the source
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Password tried before asking the password handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// MIME type used to interpret in-memory buffers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl LoadConfig {
    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    #[must_use]
    pub fn merged(&self, overrides: Option<&LoadConfig>) -> LoadConfig {
        let Some(overrides) = overrides else {
            return self.clone();
        };

        LoadConfig {
            password: overrides.password.clone().or_else(|| self.password.clone()),
            content_type: overrides
                .content_type
                .clone()
                .or_else(|| self.content_type.clone()),
        }
    }
}

/// Where the document bytes come from
#[derive(Clone)]
pub enum SourceData {
    /// Filesystem path or URL
    Url(String),
    /// In-memory document
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for SourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceData::Url(url) => f.debug_tuple("Url").field(url).finish(),
            SourceData::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// URLs compare by value, buffers by identity.
impl PartialEq for SourceData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SourceData::Url(a), SourceData::Url(b)) => a == b,
            (SourceData::Bytes(a), SourceData::Bytes(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A document to load plus optional engine-specific options
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub data: SourceData,
    pub config: Option<LoadConfig>,
}

impl Source {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            data: SourceData::Url(url.into()),
            config: None,
        }
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::url(path.as_ref().to_string_lossy().into_owned())
    }

    pub fn bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: SourceData::Bytes(bytes.into()),
            config: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoadConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// An empty URL or buffer never triggers a load.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.data {
            SourceData::Url(url) => url.trim().is_empty(),
            SourceData::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            SourceData::Url(url) => f.write_str(url),
            SourceData::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}
