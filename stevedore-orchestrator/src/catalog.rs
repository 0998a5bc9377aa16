//! App and ExecutionSystem catalogs
//!
//! Both catalogs are JSON maps keyed by id, loaded once at process start
//! and read-only for the lifetime of the process.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use stevedore_core::domain::app::App;
use stevedore_core::domain::system::ExecutionSystem;

/// Read-only catalogs of runnable apps and their target systems
#[derive(Debug, Clone)]
pub struct Catalog {
    apps: HashMap<String, App>,
    systems: HashMap<String, ExecutionSystem>,
}

impl Catalog {
    pub fn load(apps_path: impl AsRef<Path>, systems_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let apps_path = apps_path.as_ref();
        let systems_path = systems_path.as_ref();

        let apps: HashMap<String, App> = serde_json::from_str(
            &std::fs::read_to_string(apps_path)
                .with_context(|| format!("reading app catalog {}", apps_path.display()))?,
        )
        .with_context(|| format!("parsing app catalog {}", apps_path.display()))?;

        let systems: HashMap<String, ExecutionSystem> = serde_json::from_str(
            &std::fs::read_to_string(systems_path)
                .with_context(|| format!("reading system catalog {}", systems_path.display()))?,
        )
        .with_context(|| format!("parsing system catalog {}", systems_path.display()))?;

        tracing::info!(
            "Loaded {} app(s) and {} execution system(s)",
            apps.len(),
            systems.len()
        );

        Ok(Self { apps, systems })
    }

    pub fn from_parts(
        apps: HashMap<String, App>,
        systems: HashMap<String, ExecutionSystem>,
    ) -> Self {
        Self { apps, systems }
    }

    pub fn app(&self, id: &str) -> Option<&App> {
        self.apps.get(id)
    }

    pub fn system(&self, id: &str) -> Option<&ExecutionSystem> {
        self.systems.get(id)
    }

    /// Resolves an app together with its target execution system.
    pub fn resolve(&self, app_id: &str) -> Option<(&App, &ExecutionSystem)> {
        let app = self.app(app_id)?;
        let system = self.system(&app.execution_system)?;
        Some((app, system))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        let apps: HashMap<String, App> = serde_json::from_str(
            r#"{
                "aligner-1.0": {
                    "execution_system": "cluster-1",
                    "deployment_path": "/apps/aligner",
                    "inputs": [{"id": "IN", "argument": "-i"}],
                    "parameters": []
                }
            }"#,
        )
        .unwrap();
        let systems: HashMap<String, ExecutionSystem> = serde_json::from_str(
            r#"{
                "cluster-1": {
                    "hostname": "cluster-1.example.org",
                    "username": "svc",
                    "staging_root": "/scratch/jobs",
                    "backend": {"type": "batch"}
                }
            }"#,
        )
        .unwrap();
        Catalog::from_parts(apps, systems)
    }

    #[test]
    fn test_resolve_app_and_system() {
        let catalog = sample();
        let (app, system) = catalog.resolve("aligner-1.0").unwrap();
        assert_eq!(app.execution_system, "cluster-1");
        assert_eq!(system.hostname, "cluster-1.example.org");
    }

    #[test]
    fn test_unknown_ids() {
        let catalog = sample();
        assert!(catalog.app("nope").is_none());
        assert!(catalog.resolve("nope").is_none());
    }
}
