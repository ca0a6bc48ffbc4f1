/// Server capability negotiation
///
/// A `CapabilitySnapshot` is probed once per store and cached. Builders never
/// look at the snapshot directly: they take a `Supported` token, which only
/// `CapabilitySnapshot::verify` can produce, so no scoring SQL can be built
/// for a server that was not checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;

use crate::catalog::Catalog;
use crate::errors::Bm25Error;

/// What the server must provide before any scoring fragment is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub extension: String,
    pub access_method: String,
    /// Minimum server_version_num, e.g. 170000 for PostgreSQL 17.0
    pub min_server_version: i32,
}

impl Default for Requirements {
    fn default() -> Self {
        Requirements {
            extension: "pg_textsearch".to_string(),
            access_method: "bm25".to_string(),
            min_server_version: 170000,
        }
    }
}

/// Result of probing one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub extension_present: bool,
    pub access_method_present: bool,
    /// server_version_num: major*10000 + minor*100 + patch
    pub server_version: i32,
}

/// A single unmet requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum MissingCapability {
    Extension { name: String },
    AccessMethod { name: String },
    ServerVersion { found: i32, required: i32 },
}

impl fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingCapability::Extension { name } => {
                write!(f, "extension '{}' is not installed", name)
            }
            MissingCapability::AccessMethod { name } => {
                write!(f, "index access method '{}' is not registered", name)
            }
            MissingCapability::ServerVersion { found, required } => write!(
                f,
                "server version {} ({}) is below the required {} ({})",
                format_version(*found),
                found,
                format_version(*required),
                required
            ),
        }
    }
}

/// Render a server_version_num as "major.minor" (or "major.minor.patch" for
/// pre-10 numbering, which PostgreSQL encoded with a two-digit major).
pub fn format_version(num: i32) -> String {
    let major = num / 10000;
    if major >= 10 {
        format!("{}.{}", major, num % 10000)
    } else {
        format!("{}.{}.{}", major, (num / 100) % 100, num % 100)
    }
}

/// Proof that a snapshot satisfied the requirements.
#[derive(Debug, Clone, Copy)]
pub struct Supported<'a> {
    requirements: &'a Requirements,
}

impl<'a> Supported<'a> {
    pub fn requirements(&self) -> &'a Requirements {
        self.requirements
    }
}

/// Queryable status for each capability, as printed by `pgbm25 check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub extension: String,
    pub extension_present: bool,
    pub access_method: String,
    pub access_method_present: bool,
    pub server_version: i32,
    pub min_server_version: i32,
    pub version_sufficient: bool,
    pub supported: bool,
    pub missing: Vec<MissingCapability>,
}

impl CapabilitySnapshot {
    pub fn version_sufficient(&self, requirements: &Requirements) -> bool {
        self.server_version >= requirements.min_server_version
    }

    /// Every requirement this snapshot fails, in probe order.
    pub fn missing(&self, requirements: &Requirements) -> Vec<MissingCapability> {
        let mut missing = Vec::new();
        if !self.extension_present {
            missing.push(MissingCapability::Extension {
                name: requirements.extension.clone(),
            });
        }
        if !self.access_method_present {
            missing.push(MissingCapability::AccessMethod {
                name: requirements.access_method.clone(),
            });
        }
        if !self.version_sufficient(requirements) {
            missing.push(MissingCapability::ServerVersion {
                found: self.server_version,
                required: requirements.min_server_version,
            });
        }
        missing
    }

    pub fn verify<'a>(&'a self, requirements: &'a Requirements) -> Result<Supported<'a>, Bm25Error> {
        let missing = self.missing(requirements);
        if missing.is_empty() {
            Ok(Supported { requirements })
        } else {
            Err(Bm25Error::UnsupportedServer { missing })
        }
    }

    pub fn report(&self, requirements: &Requirements) -> CapabilityReport {
        let missing = self.missing(requirements);
        CapabilityReport {
            extension: requirements.extension.clone(),
            extension_present: self.extension_present,
            access_method: requirements.access_method.clone(),
            access_method_present: self.access_method_present,
            server_version: self.server_version,
            min_server_version: requirements.min_server_version,
            version_sufficient: self.version_sufficient(requirements),
            supported: missing.is_empty(),
            missing,
        }
    }
}

/// Run the three capability checks against `catalog`.
///
/// A failing probe query is reported as `Bm25Error::Capability` and not
/// retried: it means a misconfigured environment, not a transient fault.
pub async fn probe<C: Catalog + ?Sized>(
    catalog: &C,
    requirements: &Requirements,
) -> Result<CapabilitySnapshot, Bm25Error> {
    let extension_present = catalog
        .extension_installed(&requirements.extension)
        .await
        .map_err(|e| Bm25Error::Capability(format!("extension check failed: {}", e)))?;
    let access_method_present = catalog
        .access_method_exists(&requirements.access_method)
        .await
        .map_err(|e| Bm25Error::Capability(format!("access method check failed: {}", e)))?;
    let server_version = catalog
        .server_version_num()
        .await
        .map_err(|e| Bm25Error::Capability(format!("server version check failed: {}", e)))?;

    let snapshot = CapabilitySnapshot {
        extension_present,
        access_method_present,
        server_version,
    };

    let missing = snapshot.missing(requirements);
    if missing.is_empty() {
        tracing::info!(server_version, "bm25 capabilities present");
    } else {
        tracing::warn!(
            server_version,
            extension_present,
            access_method_present,
            missing = %missing.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
            "bm25 capabilities missing"
        );
    }

    Ok(snapshot)
}

/// Populate-once snapshot cache.
///
/// The first caller probes under the write lock; later callers only take
/// the read lock. `refresh` is the only way to replace a cached snapshot.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    snapshot: RwLock<Option<CapabilitySnapshot>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached(&self) -> Option<CapabilitySnapshot> {
        *self.snapshot.read().await
    }

    pub async fn get_or_probe<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        requirements: &Requirements,
    ) -> Result<CapabilitySnapshot, Bm25Error> {
        if let Some(snapshot) = *self.snapshot.read().await {
            return Ok(snapshot);
        }

        let mut slot = self.snapshot.write().await;
        // another task may have probed while we waited for the lock
        if let Some(snapshot) = *slot {
            return Ok(snapshot);
        }
        let snapshot = probe(catalog, requirements).await?;
        *slot = Some(snapshot);
        Ok(snapshot)
    }

    pub async fn refresh<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        requirements: &Requirements,
    ) -> Result<CapabilitySnapshot, Bm25Error> {
        let mut slot = self.snapshot.write().await;
        let snapshot = probe(catalog, requirements).await?;
        *slot = Some(snapshot);
        Ok(snapshot)
    }
}
