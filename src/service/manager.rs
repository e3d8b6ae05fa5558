//! Configuration manager: owns the loaded configuration for the process.

use serde_json::Value;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::artifacts::{self, ArtifactKind};
use crate::config::{
    self, ConfigService, ConfigTree, LoadOutcome, ValidationContext, ValidationReport,
};
use crate::domain::{DeployError, Env};

/// Owns the configuration tree and coordinates load, update, and rendering.
///
/// Construct once at startup with [`ConfigManager::init`] and pass by
/// reference. Writers hold the lock across write-file-then-record-checksum,
/// so readers never see a file whose checksum is stale.
pub struct ConfigManager {
    service: ConfigService,
    env: Env,
    outcome: LoadOutcome,
    state: RwLock<ConfigTree>,
}

impl ConfigManager {
    /// Load configuration, falling back to defaults on any load failure.
    pub fn init(service: ConfigService, env: Env) -> Self {
        let (config, outcome) = service.load(&env);
        debug!("Configuration source: {}", outcome);
        Self {
            service,
            env,
            outcome,
            state: RwLock::new(config),
        }
    }

    pub fn service(&self) -> &ConfigService {
        &self.service
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// How the configuration was obtained at startup.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    fn read(&self) -> RwLockReadGuard<'_, ConfigTree> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConfigTree> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ConfigTree {
        self.read().clone()
    }

    /// Merge `partial` onto the current configuration and persist the result.
    ///
    /// A partial that does not produce a valid tree is rejected and nothing
    /// changes. If persisting fails, the in-memory state keeps the update and
    /// the error is returned.
    pub fn update(&self, partial: Value) -> Result<(), DeployError> {
        let mut state = self.write();
        let next = config::apply(&state, partial)?;
        *state = next;
        info!("Configuration updated");
        self.service.persist(&state)?;
        Ok(())
    }

    /// Persist the current configuration as-is.
    pub fn save(&self) -> Result<(), DeployError> {
        let state = self.write();
        self.service.persist(&state)?;
        Ok(())
    }

    /// Run semantic validation against the current configuration.
    pub fn validate(&self, ctx: &ValidationContext) -> ValidationReport {
        config::validate(&self.read(), ctx)
    }

    /// Render one artifact from the current configuration.
    pub fn generate(&self, kind: ArtifactKind) -> Result<String, DeployError> {
        artifacts::render(kind, &self.read())
    }

    /// Render every artifact from one consistent snapshot.
    pub fn generate_all(&self) -> Result<Vec<(ArtifactKind, String)>, DeployError> {
        let state = self.read();
        ArtifactKind::ALL
            .iter()
            .map(|kind| Ok((*kind, artifacts::render(*kind, &state)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{defaults, Verification, DEFAULT_CACHE_URL_VAR};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;

    fn no_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    fn manager(dir: &Path) -> ConfigManager {
        ConfigManager::init(ConfigService::new(dir.join("production.json")), no_env())
    }

    #[test]
    fn test_fresh_environment_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        assert_eq!(manager.load_outcome(), &LoadOutcome::Defaults);
        let config = manager.config();
        assert_eq!(config.environment.name, "production");
        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 3);
        assert_eq!(config.deployment.scaling.horizontal.max_replicas, 10);
    }

    #[test]
    fn test_update_changes_only_named_field() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let before = manager.config();

        manager
            .update(json!({"environment": {"domain": "x"}}))
            .unwrap();

        let after = manager.config();
        assert_eq!(after.environment.domain, "x");

        let mut expected = before;
        expected.environment.domain = "x".to_string();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_update_persists_file_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager
            .update(json!({"deployment": {"strategy": "recreate"}}))
            .unwrap();

        let raw = fs::read(manager.service().path()).unwrap();
        assert_eq!(manager.service().verifier().verify(&raw), Verification::Match);

        // A second process start picks the update up
        let reloaded = ConfigManager::init(manager.service().clone(), no_env());
        assert_eq!(reloaded.load_outcome(), &LoadOutcome::Persisted);
        assert_eq!(reloaded.config(), manager.config());
    }

    #[test]
    fn test_rejected_update_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let before = manager.config();

        let err = manager
            .update(json!({"deployment": {"scaling": {"horizontal": {"minReplicas": 50}}}}))
            .unwrap_err();
        assert!(matches!(err, DeployError::Invariant(_)));

        let err = manager.update(json!({"deployment": {"port": "http"}})).unwrap_err();
        assert!(matches!(err, DeployError::InvalidUpdate(_)));

        assert!(manager.update(json!("domain")).is_err());

        assert_eq!(manager.config(), before);
        assert!(!manager.service().path().exists());
    }

    #[test]
    fn test_persist_failure_surfaces_but_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let manager = ConfigManager::init(
            ConfigService::new(blocker.join("production.json")),
            no_env(),
        );

        let err = manager
            .update(json!({"environment": {"domain": "y"}}))
            .unwrap_err();
        assert!(matches!(err, DeployError::Persist { .. }));
        assert_eq!(manager.config().environment.domain, "y");
    }

    #[test]
    fn test_corrupted_sidecar_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let first = manager(dir.path());
        first
            .update(json!({"environment": {"domain": "persisted.example"}}))
            .unwrap();
        fs::write(first.service().verifier().checksum_path(), "0000\n").unwrap();

        let second = manager(dir.path());
        assert!(matches!(second.load_outcome(), LoadOutcome::Discarded { .. }));
        assert_eq!(second.config(), defaults(&no_env()));
    }

    #[test]
    fn test_validate_and_generate_use_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager
            .update(json!({
                "security": {"tls": {"enabled": false}},
                "performance": {"compression": {"gzip": false}}
            }))
            .unwrap();

        let ctx = ValidationContext::from_env(&no_env(), DEFAULT_CACHE_URL_VAR);
        assert!(manager.validate(&ctx).is_valid());

        let nginx = manager.generate(ArtifactKind::Nginx).unwrap();
        assert!(!nginx.contains("gzip"));

        let all = manager.generate_all().unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[2], (ArtifactKind::Nginx, nginx));
    }

    #[test]
    fn test_concurrent_updates_keep_file_and_checksum_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let horizontal = json!({"maxReplicas": 10 + i});
                    manager
                        .update(json!({"deployment": {"scaling": {"horizontal": horizontal}}}))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let raw = fs::read(manager.service().path()).unwrap();
        assert_eq!(manager.service().verifier().verify(&raw), Verification::Match);

        let on_disk: ConfigTree = serde_json::from_slice(&raw).unwrap();
        assert_eq!(on_disk, manager.config());
    }
}
