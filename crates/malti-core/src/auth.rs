//! API-key credential cache backed by a hot-reloadable TOML file.
//!
//! Lookup tables are rebuilt wholesale on each reload and swapped in as one
//! `Arc`, so concurrent validations always observe either the old table set
//! or the fully-built new one. The filesystem is consulted at most once per
//! check interval, and a failed reload keeps the last-known-good tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DashboardThresholds;

/// How often the configuration file's mtime is re-checked.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    Service,
    User,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Ingest,
    Metrics,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Metrics => "metrics",
        }
    }
}

/// A resolved identity: what a presented API key maps to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: IdentityKind,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Identity {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    fn service(name: String) -> Self {
        Self {
            kind: IdentityKind::Service,
            name,
            permissions: vec![Permission::Ingest],
        }
    }

    fn user(name: String) -> Self {
        Self {
            kind: IdentityKind::User,
            name,
            permissions: vec![Permission::Metrics],
        }
    }
}

#[derive(Debug, Error)]
enum CredentialError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// On-disk shape: [services.<name>], [users.<name>], [dashboard.thresholds].
#[derive(Debug, Default, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    services: HashMap<String, ServiceEntry>,
    #[serde(default)]
    users: HashMap<String, UserEntry>,
    #[serde(default)]
    dashboard: DashboardSection,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    api_key: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardSection {
    #[serde(default)]
    thresholds: ThresholdOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdOverrides {
    error_rate_success_threshold: Option<f64>,
    error_rate_warning_threshold: Option<f64>,
    latency_success_threshold: Option<f64>,
    latency_warning_threshold: Option<f64>,
}

impl ThresholdOverrides {
    fn resolve(&self) -> DashboardThresholds {
        let defaults = DashboardThresholds::default();
        DashboardThresholds {
            error_rate_success_threshold: self
                .error_rate_success_threshold
                .unwrap_or(defaults.error_rate_success_threshold),
            error_rate_warning_threshold: self
                .error_rate_warning_threshold
                .unwrap_or(defaults.error_rate_warning_threshold),
            latency_success_threshold: self
                .latency_success_threshold
                .unwrap_or(defaults.latency_success_threshold),
            latency_warning_threshold: self
                .latency_warning_threshold
                .unwrap_or(defaults.latency_warning_threshold),
        }
    }
}

#[derive(Debug, Default)]
struct CredentialTables {
    service_keys: HashMap<String, String>,
    user_keys: HashMap<String, String>,
    by_api_key: HashMap<String, Identity>,
    thresholds: DashboardThresholds,
}

impl CredentialTables {
    fn from_file(file: CredentialFile) -> Self {
        let mut tables = Self {
            thresholds: file.dashboard.thresholds.resolve(),
            ..Self::default()
        };

        for (name, entry) in file.services {
            let Some(api_key) = entry.api_key else {
                warn!("service '{}' has no api_key, skipping", name);
                continue;
            };
            tables
                .by_api_key
                .insert(api_key.clone(), Identity::service(name.clone()));
            tables.service_keys.insert(name, api_key);
        }

        for (name, entry) in file.users {
            let Some(api_key) = entry.api_key else {
                warn!("user '{}' has no api_key, skipping", name);
                continue;
            };
            tables
                .by_api_key
                .insert(api_key.clone(), Identity::user(name.clone()));
            tables.user_keys.insert(name, api_key);
        }

        tables
    }
}

#[derive(Debug, Default)]
struct ReloadState {
    last_check: Option<Instant>,
    mtime: Option<SystemTime>,
}

/// Resolves API keys to identities without blocking request handling.
///
/// Readers only take the table lock long enough to clone an `Arc`; the
/// reload path parses the file off to the side and swaps the reference in.
pub struct CredentialCache {
    config_path: PathBuf,
    check_interval: Duration,
    tables: RwLock<Arc<CredentialTables>>,
    reload_state: Mutex<ReloadState>,
}

impl CredentialCache {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self::with_check_interval(config_path, DEFAULT_CHECK_INTERVAL)
    }

    pub fn with_check_interval(config_path: impl AsRef<Path>, check_interval: Duration) -> Self {
        let config_path = config_path.as_ref().to_path_buf();
        let mut state = ReloadState::default();

        let tables = match load_tables(&config_path) {
            Ok(tables) => {
                state.mtime = file_mtime(&config_path);
                state.last_check = Some(Instant::now());
                info!(
                    "loaded {} services and {} users from {}",
                    tables.service_keys.len(),
                    tables.user_keys.len(),
                    config_path.display()
                );
                tables
            }
            Err(err) => {
                // Startup without credentials is allowed; the next staleness
                // check picks the file up once it appears.
                error!(
                    "failed to load credential config {}: {}",
                    config_path.display(),
                    err
                );
                CredentialTables::default()
            }
        };

        Self {
            config_path,
            check_interval,
            tables: RwLock::new(Arc::new(tables)),
            reload_state: Mutex::new(state),
        }
    }

    /// Resolve an API key to its identity. O(1) after the staleness check.
    pub fn validate(&self, api_key: &str) -> Option<Identity> {
        self.maybe_reload();

        let identity = self.current().by_api_key.get(api_key).cloned();
        match &identity {
            Some(identity) => debug!("authenticated {:?} '{}'", identity.kind, identity.name),
            None => {
                let prefix: String = api_key.chars().take(10).collect();
                warn!("invalid API key presented: {}...", prefix);
            }
        }
        identity
    }

    /// Current dashboard display thresholds, after the same staleness check
    /// as [`CredentialCache::validate`].
    pub fn dashboard_thresholds(&self) -> DashboardThresholds {
        self.maybe_reload();
        self.current().thresholds
    }

    /// Number of known (services, users). Used for startup logging.
    pub fn stats(&self) -> (usize, usize) {
        let tables = self.current();
        (tables.service_keys.len(), tables.user_keys.len())
    }

    fn current(&self) -> Arc<CredentialTables> {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn maybe_reload(&self) {
        let known_mtime = {
            let mut state = self
                .reload_state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            if let Some(last) = state.last_check {
                if now.duration_since(last) < self.check_interval {
                    return;
                }
            }
            // Claim this check before doing any I/O so concurrent callers
            // fall through immediately instead of queueing behind the disk.
            state.last_check = Some(now);
            state.mtime
        };

        let current_mtime = match file_mtime(&self.config_path) {
            Some(mtime) => mtime,
            None => {
                warn!(
                    "credential config {} not readable, keeping current tables",
                    self.config_path.display()
                );
                return;
            }
        };
        if known_mtime == Some(current_mtime) {
            return;
        }

        info!("credential config changed, reloading");
        match load_tables(&self.config_path) {
            Ok(tables) => {
                info!(
                    "loaded {} services and {} users from {}",
                    tables.service_keys.len(),
                    tables.user_keys.len(),
                    self.config_path.display()
                );
                {
                    let mut state = self
                        .reload_state
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    state.mtime = Some(current_mtime);
                }
                let mut guard = self
                    .tables
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *guard = Arc::new(tables);
            }
            Err(err) => {
                // A reload failure must never render the service
                // unauthenticatable: keep the last-known-good tables.
                error!("credential config reload failed, keeping previous tables: {err}");
            }
        }
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn load_tables(path: &Path) -> Result<CredentialTables, CredentialError> {
    let raw = std::fs::read_to_string(path)?;
    let file: CredentialFile = toml::from_str(&raw)?;
    Ok(CredentialTables::from_file(file))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{CredentialCache, IdentityKind, Permission};

    const CONFIG: &str = r#"
[services.payments]
api_key = "svc-key-1"
description = "payments workers"

[users.alice]
api_key = "user-key-1"

[dashboard.thresholds]
error_rate_warning_threshold = 5.0
"#;

    fn write_config(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("malti.toml");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn resolves_services_and_users_with_fixed_permissions() {
        let dir = tempdir().expect("temp dir");
        let path = write_config(dir.path(), CONFIG);
        let cache = CredentialCache::new(&path);

        let service = cache.validate("svc-key-1").expect("service identity");
        assert_eq!(service.kind, IdentityKind::Service);
        assert_eq!(service.name, "payments");
        assert!(service.has_permission(Permission::Ingest));
        assert!(!service.has_permission(Permission::Metrics));

        let user = cache.validate("user-key-1").expect("user identity");
        assert_eq!(user.kind, IdentityKind::User);
        assert_eq!(user.name, "alice");
        assert!(user.has_permission(Permission::Metrics));

        assert_eq!(cache.validate("unknown"), None);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn thresholds_merge_overrides_with_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = write_config(dir.path(), CONFIG);
        let cache = CredentialCache::new(&path);

        let thresholds = cache.dashboard_thresholds();
        assert_eq!(thresholds.error_rate_warning_threshold, 5.0);
        assert_eq!(thresholds.error_rate_success_threshold, 1.0);
        assert_eq!(thresholds.latency_success_threshold, 300.0);
    }

    #[test]
    fn rotated_key_takes_effect_after_throttle_interval() {
        let dir = tempdir().expect("temp dir");
        let path = write_config(dir.path(), CONFIG);
        let cache = CredentialCache::with_check_interval(&path, Duration::ZERO);

        assert!(cache.validate("user-key-1").is_some());

        // Rotate alice's key on disk. The small sleep guarantees a distinct
        // mtime on coarse-grained filesystems.
        std::thread::sleep(Duration::from_millis(20));
        write_config(
            dir.path(),
            &CONFIG.replace("user-key-1", "user-key-2"),
        );

        assert_eq!(cache.validate("user-key-1"), None);
        let user = cache.validate("user-key-2").expect("rotated identity");
        assert_eq!(user.kind, IdentityKind::User);
        assert_eq!(user.name, "alice");
    }

    #[test]
    fn unparsable_reload_keeps_last_known_good_tables() {
        let dir = tempdir().expect("temp dir");
        let path = write_config(dir.path(), CONFIG);
        let cache = CredentialCache::with_check_interval(&path, Duration::ZERO);

        std::thread::sleep(Duration::from_millis(20));
        write_config(dir.path(), "not [valid toml ===");

        let service = cache.validate("svc-key-1").expect("stale but valid");
        assert_eq!(service.name, "payments");
    }

    #[test]
    fn missing_config_starts_empty_without_panicking() {
        let dir = tempdir().expect("temp dir");
        let cache = CredentialCache::new(dir.path().join("absent.toml"));
        assert_eq!(cache.validate("anything"), None);
        assert_eq!(cache.stats(), (0, 0));
        // Built-in defaults still served.
        assert_eq!(
            cache.dashboard_thresholds().error_rate_success_threshold,
            1.0
        );
    }

    #[test]
    fn throttle_skips_filesystem_checks_inside_interval() {
        let dir = tempdir().expect("temp dir");
        let path = write_config(dir.path(), CONFIG);
        let cache = CredentialCache::with_check_interval(&path, Duration::from_secs(3600));

        std::thread::sleep(Duration::from_millis(20));
        write_config(dir.path(), &CONFIG.replace("user-key-1", "user-key-2"));

        // Inside the interval the rotation is not yet visible.
        assert!(cache.validate("user-key-1").is_some());
        assert_eq!(cache.validate("user-key-2"), None);
    }
}
