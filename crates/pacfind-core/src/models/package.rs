use std::fmt::{Display, Formatter};
use std::time::SystemTime;

pub const PLACEHOLDER_DESCRIPTION: &str = "Package not found in any configured repository or the AUR";

/// Where a record came from.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum SourceTag {
    Local,
    Sync(String),
    Remote,
    /// Only used for placeholders synthesized by batch resolution.
    Unknown,
}

impl SourceTag {
    pub fn sync(repository: impl Into<String>) -> Self {
        Self::Sync(repository.into())
    }

    /// Repository label used in listings and the JSON export format.
    pub fn repository(&self) -> &str {
        match self {
            Self::Local => "local",
            Self::Sync(name) => name.as_str(),
            Self::Remote => "AUR",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }
}

impl Display for SourceTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.repository())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub description: String,
    pub source: SourceTag,
    pub maintainer: Option<String>,
    pub upstream_url: Option<String>,
    pub depends: Vec<String>,
    pub last_modified: Option<SystemTime>,
    pub download_size: Option<u64>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>, source: SourceTag) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            source,
            maintainer: None,
            upstream_url: None,
            depends: Vec::new(),
            last_modified: None,
            download_size: None,
        }
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            ..Self::new(name, "", SourceTag::Unknown)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_download_size(mut self, size: u64) -> Self {
        self.download_size = Some(size);
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == SourceTag::Unknown
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateRecord {
    pub name: String,
    pub installed_version: String,
    pub available_version: String,
    pub source: SourceTag,
    /// Zero when the source does not publish artifact sizes.
    pub download_size: u64,
}
