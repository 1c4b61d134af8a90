use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Default paths for Arch Linux.
const DEFAULT_DBPATH: &str = "/var/lib/pacman";
const DEFAULT_PACMAN_CONF: &str = "/etc/pacman.conf";
const DEFAULT_AUR_RPC_URL: &str = "https://aur.archlinux.org/rpc/";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;
const DEFAULT_ELEVATION: &str = "pkexec";
const DEFAULT_HELPER: &str = "yay";
/// Used when `pacman.conf` is missing or lists no repositories.
const FALLBACK_REPOSITORIES: &[&str] = &["core", "extra"];

pub const ENV_DBPATH: &str = "PACFIND_DBPATH";
pub const ENV_PACMAN_CONF: &str = "PACFIND_PACMAN_CONF";
pub const ENV_AUR_URL: &str = "PACFIND_AUR_URL";
pub const ENV_OFFLINE: &str = "PACFIND_OFFLINE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Transport timeout; the only fixed timeout in the engine.
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AUR_RPC_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Commands used for privileged package actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivilegedConfig {
    /// Elevation wrapper, e.g. `pkexec` or `sudo`.
    pub elevation: String,
    /// Package helper invoked through the wrapper.
    pub helper: String,
}

impl Default for PrivilegedConfig {
    fn default() -> Self {
        Self {
            elevation: DEFAULT_ELEVATION.to_string(),
            helper: DEFAULT_HELPER.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub dbpath: PathBuf,
    pub pacman_conf: PathBuf,
    /// Sync repositories in priority order.
    pub repositories: Vec<String>,
    /// `None` disables the remote source.
    pub remote: Option<RemoteConfig>,
    pub batch_concurrency: usize,
    pub privileged: PrivilegedConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dbpath: PathBuf::from(DEFAULT_DBPATH),
            pacman_conf: PathBuf::from(DEFAULT_PACMAN_CONF),
            repositories: FALLBACK_REPOSITORIES.iter().map(|r| r.to_string()).collect(),
            remote: Some(RemoteConfig::default()),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            privileged: PrivilegedConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Defaults, then `PACFIND_*` environment overrides, then the repository
    /// list from `pacman.conf`.
    pub fn load() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config.reload_repositories();
        config
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dbpath) = lookup(ENV_DBPATH).filter(|v| !v.is_empty()) {
            self.dbpath = PathBuf::from(dbpath);
        }
        if let Some(conf) = lookup(ENV_PACMAN_CONF).filter(|v| !v.is_empty()) {
            self.pacman_conf = PathBuf::from(conf);
        }
        if let Some(url) = lookup(ENV_AUR_URL).filter(|v| !v.is_empty()) {
            if let Some(remote) = self.remote.as_mut() {
                remote.base_url = url;
            }
        }
        if lookup(ENV_OFFLINE).is_some_and(|v| is_truthy(&v)) {
            self.remote = None;
        }
    }

    /// Re-reads the repository list from `pacman_conf`, keeping the fallback
    /// list when the file is unreadable or names no repositories.
    pub fn reload_repositories(&mut self) {
        match fs::read_to_string(&self.pacman_conf) {
            Ok(content) => {
                let repositories = parse_pacman_repositories(&content);
                if repositories.is_empty() {
                    warn!(
                        path = %self.pacman_conf.display(),
                        "no repositories configured; using defaults"
                    );
                    return;
                }
                debug!(?repositories, "loaded repositories from pacman.conf");
                self.repositories = repositories;
            }
            Err(error) => warn!(
                path = %self.pacman_conf.display(),
                %error,
                "failed to read pacman.conf; using default repositories"
            ),
        }
    }

    pub fn sync_db_path(&self, repository: &str) -> PathBuf {
        sync_db_path(&self.dbpath, repository)
    }
}

pub fn sync_db_path(dbpath: &Path, repository: &str) -> PathBuf {
    dbpath.join("sync").join(format!("{repository}.db"))
}

/// Section names of `pacman.conf` in file order, minus `[options]`.
pub fn parse_pacman_repositories(content: &str) -> Vec<String> {
    let mut repositories: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let Some(section) = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
        else {
            continue;
        };
        if section.is_empty() || section.eq_ignore_ascii_case("options") {
            continue;
        }
        if !repositories.iter().any(|known| known == section) {
            repositories.push(section.to_string());
        }
    }
    repositories
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
