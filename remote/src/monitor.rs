//! Health overview of the remote services.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::StageKind;
use serde::Serialize;

use crate::client::ServiceEndpoints;

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if healthy == total {
            Self::Healthy
        } else if healthy > 0 {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub url: String,
    pub status: HealthState,
    pub response_time_ms: Option<u64>,
    pub last_check: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServersReport {
    pub servers: BTreeMap<String, ServerStatus>,
    pub overall_status: OverallStatus,
    pub healthy_servers: usize,
    pub total_servers: usize,
}

#[derive(Debug, Clone)]
struct MonitoredServer {
    name: &'static str,
    stage: StageKind,
    base_url: String,
    health_url: String,
}

/// Probes `ism` (segmentation), `pem` (pose) and `render` concurrently.
#[derive(Debug, Clone)]
pub struct ServerMonitor {
    http: reqwest::Client,
    servers: Vec<MonitoredServer>,
    timeout: Duration,
}

impl ServerMonitor {
    pub fn new(endpoints: &ServiceEndpoints, timeout: Duration) -> Self {
        let servers = [("ism", StageKind::Segment), ("pem", StageKind::Estimate), ("render", StageKind::Render)]
            .into_iter()
            .map(|(name, stage)| MonitoredServer {
                name,
                stage,
                base_url: endpoints.base_url(stage).to_string(),
                health_url: endpoints.health_url(stage),
            })
            .collect();
        Self {
            http: reqwest::Client::new(),
            servers,
            timeout,
        }
    }

    pub fn server_names(&self) -> Vec<&'static str> {
        self.servers.iter().map(|s| s.name).collect()
    }

    fn find(&self, name: &str) -> Option<&MonitoredServer> {
        let name = name.to_ascii_lowercase();
        self.servers.iter().find(|s| s.name == name || s.stage.as_str() == name)
    }

    /// Status of one server by name (`ism`/`segment`, `pem`/`estimate`, `render`).
    pub async fn check_server(&self, name: &str) -> Option<ServerStatus> {
        let server = self.find(name)?;
        Some(self.probe(server).await)
    }

    pub async fn check_all(&self) -> ServersReport {
        let probes = self.servers.iter().map(|s| async move { (s.name.to_string(), self.probe(s).await) });
        let servers: BTreeMap<String, ServerStatus> = futures::future::join_all(probes).await.into_iter().collect();

        let total_servers = servers.len();
        let healthy_servers = servers.values().filter(|s| s.status == HealthState::Healthy).count();
        ServersReport {
            servers,
            overall_status: OverallStatus::from_counts(healthy_servers, total_servers),
            healthy_servers,
            total_servers,
        }
    }

    async fn probe(&self, server: &MonitoredServer) -> ServerStatus {
        let last_check = Utc::now();
        let started = Instant::now();
        let unhealthy = |message: String| ServerStatus {
            url: server.base_url.clone(),
            status: HealthState::Unhealthy,
            response_time_ms: None,
            last_check,
            error_message: Some(message),
        };

        match self.http.get(&server.health_url).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => ServerStatus {
                url: server.base_url.clone(),
                status: HealthState::Healthy,
                response_time_ms: Some(started.elapsed().as_millis() as u64),
                last_check,
                error_message: None,
            },
            Ok(response) => unhealthy(format!("HTTP {}", response.status().as_u16())),
            Err(e) if e.is_timeout() => unhealthy("Connection timeout".to_string()),
            Err(e) => {
                tracing::debug!(server = server.name, error = %e, "Health probe failed");
                unhealthy(e.to_string())
            }
        }
    }
}
