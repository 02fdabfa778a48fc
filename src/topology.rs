use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Role a service plays in the topology under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Api,
    Database,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Api => write!(f, "api"),
            ServiceKind::Database => write!(f, "database"),
        }
    }
}

/// A single service instance addressed by logical name.
///
/// `container` is the handle the lifecycle backend operates on; `health_url`
/// is the endpoint whose payload classifies this service. A database service
/// is observed through the API's health endpoint (the API runs a `SELECT 1`
/// on every health call), so both specs typically share the same URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub kind: ServiceKind,
    pub container: String,
    pub health_url: String,
}

/// The fixed two-service topology: one API process plus one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub services: Vec<ServiceSpec>,
}

impl Topology {
    /// Read a topology definition from a YAML file
    pub fn from_yaml<R: Read>(reader: R) -> eyre::Result<Self> {
        serde_yaml::from_reader(reader).wrap_err("Failed to parse topology YAML")
    }

    /// Default topology matching the docker-compose deployment
    pub fn default_local(base_url: &str) -> Self {
        let health_url = format!("{}/health", base_url.trim_end_matches('/'));
        Self {
            services: vec![
                ServiceSpec {
                    name: "api".to_string(),
                    kind: ServiceKind::Api,
                    container: "recovery_fastapi".to_string(),
                    health_url: health_url.clone(),
                },
                ServiceSpec {
                    name: "database".to_string(),
                    kind: ServiceKind::Database,
                    container: "recovery_postgres".to_string(),
                    health_url,
                },
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services the named service depends on. The API depends on every
    /// database in the topology; a database depends on nothing.
    pub fn dependencies_of(&self, name: &str) -> Vec<&ServiceSpec> {
        match self.get(name).map(|s| s.kind) {
            Some(ServiceKind::Api) => self
                .services
                .iter()
                .filter(|s| s.kind == ServiceKind::Database)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}
