use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    pub usage_percent: f32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy {
        status: String,
        latency_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pool: Option<PoolStats>,
    },
    Unhealthy {
        status: String,
        error: String,
    },
}

impl DependencyStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, DependencyStatus::Healthy { .. })
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// A failing critical dependency makes the service unhealthy rather than degraded.
    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn pool_stats(&self) -> PoolStats {
        let active_connections = self.pool.size();
        let max_connections = self.pool.options().get_max_connections();
        PoolStats {
            active_connections,
            idle_connections: self.pool.num_idle() as u32,
            max_connections,
            usage_percent: if max_connections == 0 {
                0.0
            } else {
                (active_connections as f32 / max_connections as f32) * 100.0
            },
        }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
                pool: Some(self.pool_stats()),
            },
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the payment gateway's circuit breaker; an open circuit degrades the service.
pub struct GatewayChecker {
    gateway: Arc<crate::adapters::HttpPaymentGateway>,
}

impl GatewayChecker {
    pub fn new(gateway: Arc<crate::adapters::HttpPaymentGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DependencyChecker for GatewayChecker {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus {
        match self.gateway.circuit_state() {
            "open" => DependencyStatus::unhealthy("circuit breaker open"),
            _ => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: 0,
                pool: None,
            },
        }
    }
}

pub async fn check_health(
    checkers: &[Arc<dyn DependencyChecker>],
    start_time: Instant,
) -> HealthResponse {
    let results = futures::future::join_all(checkers.iter().map(|checker| async move {
        let status = timeout(CHECK_TIMEOUT, checker.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
        (checker.name(), checker.critical(), status)
    }))
    .await;

    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;
    let mut dependencies = HashMap::new();
    for (name, critical, status) in results {
        if !status.is_healthy() {
            if critical {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
        dependencies.insert(name.to_string(), status);
    }

    let status = if has_critical_failure {
        "unhealthy"
    } else if has_non_critical_failure {
        "degraded"
    } else {
        "healthy"
    };

    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        critical: bool,
        healthy: bool,
    }

    #[async_trait]
    impl DependencyChecker for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn check(&self) -> DependencyStatus {
            if self.healthy {
                DependencyStatus::Healthy {
                    status: "healthy".to_string(),
                    latency_ms: 1,
                    pool: None,
                }
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    fn checker(name: &'static str, critical: bool, healthy: bool) -> Arc<dyn DependencyChecker> {
        Arc::new(Fixed {
            name,
            critical,
            healthy,
        })
    }

    #[tokio::test]
    async fn non_critical_failure_degrades() {
        let health = check_health(
            &[checker("postgres", true, true), checker("gateway", false, false)],
            Instant::now(),
        )
        .await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn critical_failure_is_unhealthy() {
        let health = check_health(
            &[checker("postgres", true, false), checker("gateway", false, false)],
            Instant::now(),
        )
        .await;
        assert_eq!(health.status, "unhealthy");
    }

    #[tokio::test]
    async fn no_dependencies_is_healthy() {
        let health = check_health(&[], Instant::now()).await;
        assert_eq!(health.status, "healthy");
    }
}
