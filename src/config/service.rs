//! Configuration service for loading and persisting the configuration file.

use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::defaults::{defaults, vars};
use super::integrity::{IntegrityVerifier, Verification};
use super::validation::check_invariants;
use super::ConfigTree;
use crate::domain::{DeployError, Env};

/// Fixed system path used when no override is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/deploykit/production.json";

/// How the configuration in effect was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No persisted file; schema defaults in effect
    Defaults,
    /// Persisted overlay merged onto defaults
    Persisted,
    /// Persisted file rejected; schema defaults in effect
    Discarded { reason: String },
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOutcome::Defaults => f.write_str("defaults"),
            LoadOutcome::Persisted => f.write_str("persisted file"),
            LoadOutcome::Discarded { reason } => write!(f, "defaults (file discarded: {})", reason),
        }
    }
}

/// Reads and writes the configuration file and its checksum sidecar.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    verifier: IntegrityVerifier,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let verifier = IntegrityVerifier::for_config(&path);
        Self { path, verifier }
    }

    /// Resolve the configuration path from an explicit value, the environment,
    /// or the fixed default.
    pub fn resolve(path: Option<&Path>, env: &Env) -> Self {
        let path = path
            .map(PathBuf::from)
            .or_else(|| {
                env.var(vars::CONFIG_PATH)
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verifier(&self) -> &IntegrityVerifier {
        &self.verifier
    }

    /// Load configuration: defaults, overlaid by the persisted file when it is
    /// present, parsable, and intact. Never fails.
    pub fn load(&self, env: &Env) -> (ConfigTree, LoadOutcome) {
        let base = defaults(env);

        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", self.path.display());
                return (base, LoadOutcome::Defaults);
            }
            Err(e) => {
                return self.discard(base, format!("failed to read file: {}", e));
            }
        };

        match self.verifier.verify(&raw) {
            Verification::NoBaseline | Verification::Match => {}
            Verification::Mismatch { expected, actual } => {
                return self.discard(
                    base,
                    format!("checksum mismatch (expected {}, found {})", expected, actual),
                );
            }
            Verification::Unreadable(e) => {
                return self.discard(base, format!("checksum unreadable: {}", e));
            }
        }

        match overlay(&base, &raw) {
            Ok(config) => {
                info!("Loaded configuration from {}", self.path.display());
                (config, LoadOutcome::Persisted)
            }
            Err(reason) => self.discard(base, reason),
        }
    }

    fn discard(&self, base: ConfigTree, reason: String) -> (ConfigTree, LoadOutcome) {
        warn!(
            "Ignoring configuration at {}: {}; using defaults",
            self.path.display(),
            reason
        );
        (base, LoadOutcome::Discarded { reason })
    }

    /// Write `config` in canonical form, then record the checksum of the exact
    /// bytes written. Returns those bytes.
    pub fn persist(&self, config: &ConfigTree) -> Result<Vec<u8>, DeployError> {
        let bytes = canonical_bytes(config)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DeployError::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&self.path, &bytes).map_err(|source| DeployError::Persist {
            path: self.path.clone(),
            source,
        })?;
        self.verifier.record(&bytes)?;

        info!("Persisted configuration to {}", self.path.display());
        Ok(bytes)
    }
}

/// Canonical serialization: pretty JSON with a trailing newline.
pub fn canonical_bytes(config: &ConfigTree) -> Result<Vec<u8>, DeployError> {
    let mut bytes = serde_json::to_vec_pretty(config)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Merge persisted bytes onto `base`.
fn overlay(base: &ConfigTree, raw: &[u8]) -> Result<ConfigTree, String> {
    let document: Value =
        serde_json::from_slice(raw).map_err(|e| format!("failed to parse file: {}", e))?;
    apply(base, document).map_err(|e| e.to_string())
}

/// Merge a partial document onto `base`, producing a tree that satisfies the
/// invariants.
pub fn apply(base: &ConfigTree, partial: Value) -> Result<ConfigTree, DeployError> {
    if !partial.is_object() {
        return Err(DeployError::InvalidUpdate(
            "configuration document must be a JSON object".to_string(),
        ));
    }

    let mut merged = serde_json::to_value(base)?;
    merge(&mut merged, partial);

    let config: ConfigTree =
        serde_json::from_value(merged).map_err(|e| DeployError::InvalidUpdate(e.to_string()))?;
    check_invariants(&config)?;
    Ok(config)
}

/// Objects merge key by key; any other value replaces the target. Nulls are
/// ignored.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        if !value.is_null() {
                            target.insert(key, value);
                        }
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    fn service(dir: &Path) -> ConfigService {
        ConfigService::new(dir.join("conf").join("production.json"))
    }

    #[test]
    fn test_resolve_path_precedence() {
        let env = Env::mock([(vars::CONFIG_PATH, "/srv/app/config.json")]);
        assert_eq!(
            ConfigService::resolve(None, &env).path(),
            Path::new("/srv/app/config.json")
        );
        assert_eq!(
            ConfigService::resolve(Some(Path::new("/tmp/c.json")), &env).path(),
            Path::new("/tmp/c.json")
        );
        assert_eq!(
            ConfigService::resolve(None, &no_env()).path(),
            Path::new(DEFAULT_CONFIG_PATH)
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, outcome) = service(dir.path()).load(&no_env());

        assert_eq!(outcome, LoadOutcome::Defaults);
        assert_eq!(config, defaults(&no_env()));
    }

    #[test]
    fn test_persist_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut config = defaults(&no_env());
        config.environment.domain = "shop.example.org".to_string();

        let bytes = svc.persist(&config).unwrap();
        assert_eq!(fs::read(svc.path()).unwrap(), bytes);
        assert_eq!(svc.verifier().verify(&bytes), Verification::Match);

        let (loaded, outcome) = svc.load(&no_env());
        assert_eq!(outcome, LoadOutcome::Persisted);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        fs::create_dir_all(svc.path().parent().unwrap()).unwrap();
        fs::write(
            svc.path(),
            r#"{"deployment":{"scaling":{"horizontal":{"maxReplicas":20}}}}"#,
        )
        .unwrap();

        let (config, outcome) = svc.load(&no_env());
        assert_eq!(outcome, LoadOutcome::Persisted);
        assert_eq!(config.deployment.scaling.horizontal.max_replicas, 20);
        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 3);
        assert_eq!(config.environment.name, "production");
    }

    #[test]
    fn test_corrupted_checksum_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut config = defaults(&no_env());
        config.environment.domain = "persisted.example".to_string();
        svc.persist(&config).unwrap();
        fs::write(svc.verifier().checksum_path(), "deadbeef\n").unwrap();

        let (loaded, outcome) = svc.load(&no_env());
        assert!(matches!(outcome, LoadOutcome::Discarded { .. }));
        assert_eq!(loaded, defaults(&no_env()));
    }

    #[test]
    fn test_unreadable_checksum_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut config = defaults(&no_env());
        config.environment.domain = "persisted.example".to_string();
        svc.persist(&config).unwrap();

        let sidecar = svc.verifier().checksum_path();
        fs::remove_file(sidecar).unwrap();
        fs::create_dir(sidecar).unwrap();

        let (loaded, outcome) = svc.load(&no_env());
        match outcome {
            LoadOutcome::Discarded { reason } => {
                assert!(reason.contains("checksum unreadable"), "{}", reason)
            }
            other => panic!("expected discard, got {:?}", other),
        }
        assert_eq!(loaded, defaults(&no_env()));
    }

    #[test]
    fn test_blank_checksum_overlays_file() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let mut config = defaults(&no_env());
        config.environment.domain = "persisted.example".to_string();
        svc.persist(&config).unwrap();
        fs::write(svc.verifier().checksum_path(), "\n").unwrap();

        let (loaded, outcome) = svc.load(&no_env());
        assert_eq!(outcome, LoadOutcome::Persisted);
        assert_eq!(loaded.environment.domain, "persisted.example");
    }

    #[test]
    fn test_edited_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        svc.persist(&defaults(&no_env())).unwrap();
        fs::write(svc.path(), r#"{"environment":{"domain":"evil.example"}}"#).unwrap();

        let (loaded, outcome) = svc.load(&no_env());
        match outcome {
            LoadOutcome::Discarded { reason } => assert!(reason.contains("checksum")),
            other => panic!("expected discard, got {:?}", other),
        }
        assert_eq!(loaded.environment.domain, "example.com");
    }

    #[test]
    fn test_unparsable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        fs::create_dir_all(svc.path().parent().unwrap()).unwrap();

        for content in ["{ not json", "[1, 2, 3]", r#"{"deployment":{"port":"http"}}"#] {
            fs::write(svc.path(), content).unwrap();
            let (loaded, outcome) = svc.load(&no_env());
            assert!(
                matches!(outcome, LoadOutcome::Discarded { .. }),
                "{} should be discarded",
                content
            );
            assert_eq!(loaded, defaults(&no_env()));
        }
    }

    #[test]
    fn test_overlay_breaking_invariants_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        fs::create_dir_all(svc.path().parent().unwrap()).unwrap();
        fs::write(
            svc.path(),
            r#"{"deployment":{"scaling":{"horizontal":{"minReplicas":12}}}}"#,
        )
        .unwrap();

        let (_, outcome) = svc.load(&no_env());
        assert!(matches!(outcome, LoadOutcome::Discarded { .. }));

        fs::write(
            svc.path(),
            r#"{"security":{"firewall":{"rateLimit":{"maxRequests":0}}}}"#,
        )
        .unwrap();
        let (_, outcome) = svc.load(&no_env());
        assert!(matches!(outcome, LoadOutcome::Discarded { .. }));
    }

    #[test]
    fn test_persist_into_unwritable_location_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let svc = ConfigService::new(blocker.join("production.json"));

        let err = svc.persist(&defaults(&no_env())).unwrap_err();
        assert!(matches!(err, DeployError::Persist { .. }));
    }

    #[test]
    fn test_merge_rules() {
        let mut target = json!({"a": {"b": 1, "c": [1, 2]}, "d": "keep"});
        merge(&mut target, json!({"a": {"c": [3], "e": true}, "d": null}));
        assert_eq!(target, json!({"a": {"b": 1, "c": [3], "e": true}, "d": "keep"}));
    }

    #[test]
    fn test_canonical_bytes_end_with_newline() {
        let bytes = canonical_bytes(&defaults(&no_env())).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert!(String::from_utf8(bytes).unwrap().contains("\"minReplicas\": 3"));
    }
}
