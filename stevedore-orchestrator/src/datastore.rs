//! Data-store collaborator
//!
//! The data store exposes a files service used for two things the core
//! cannot do over a shell: propagating permissions on a path (so the
//! service identity can read inputs and write archives on the owner's
//! behalf) and creating directories. Both calls authenticate with the
//! job's capability token.

use anyhow::Context;
use async_trait::async_trait;

/// Permission level granted on a data-store path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::ReadWrite => "READ_WRITE",
        }
    }
}

/// Files-service contract consumed by the staging and archival steps
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Grants `permission` on `path` to the service identity.
    async fn share_path(
        &self,
        token: &str,
        path: &str,
        permission: Permission,
        recursive: bool,
    ) -> anyhow::Result<()>;

    /// Creates a directory at `path` (parents are expected to exist).
    async fn make_directory(&self, token: &str, path: &str) -> anyhow::Result<()>;
}

/// HTTP implementation of the files-service contract
#[derive(Debug, Clone)]
pub struct FilesServiceClient {
    base_url: String,
    store_id: String,
    /// Identity the permission grants are issued to.
    grantee: String,
    client: reqwest::Client,
}

impl FilesServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        store_id: impl Into<String>,
        grantee: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id: store_id.into(),
            grantee: grantee.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DataStore for FilesServiceClient {
    async fn share_path(
        &self,
        token: &str,
        path: &str,
        permission: Permission,
        recursive: bool,
    ) -> anyhow::Result<()> {
        let url = format!("{}/pems/system/{}{}", self.base_url, self.store_id, path);
        tracing::debug!("Granting {} on {}", permission.as_str(), path);

        self.client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .form(&[
                ("username", self.grantee.as_str()),
                ("permission", permission.as_str()),
                ("recursive", if recursive { "true" } else { "false" }),
            ])
            .send()
            .await
            .with_context(|| format!("permission request for {}", path))?
            .error_for_status()
            .with_context(|| format!("permission request for {} rejected", path))?;

        Ok(())
    }

    async fn make_directory(&self, token: &str, path: &str) -> anyhow::Result<()> {
        let (parent, name) = split_parent(path);
        let url = format!("{}/media/system/{}{}", self.base_url, self.store_id, parent);
        tracing::debug!("Creating data-store directory {}", path);

        self.client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .form(&[("action", "mkdir"), ("path", name)])
            .send()
            .await
            .with_context(|| format!("mkdir request for {}", path))?
            .error_for_status()
            .with_context(|| format!("mkdir request for {} rejected", path))?;

        Ok(())
    }
}

/// Splits a path into its parent directory and final segment.
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_strings() {
        assert_eq!(Permission::Read.as_str(), "READ");
        assert_eq!(Permission::ReadWrite.as_str(), "READ_WRITE");
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/home/alice/analyses"), ("/home/alice", "analyses"));
        assert_eq!(split_parent("/home/alice/analyses/"), ("/home/alice", "analyses"));
        assert_eq!(split_parent("/top"), ("/", "top"));
        assert_eq!(split_parent("bare"), ("", "bare"));
    }
}
