use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub directory: DirectoryConfig,
    pub billing: BillingConfig,
    pub retention: RetentionConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// External control plane that mints credentials and binds them to quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub quota_plan_id: String,
    pub timeout_secs: u64,
}

/// Identity directory holding per-user custom attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub endpoint: String,
    pub user_pool_id: String,
    /// Per-request listing page size. The directory caps this at 60.
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Days between a deletion request and eligibility for permanent erasure.
    pub grace_period_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

/// Maximum listing page size accepted by the identity directory.
pub const DIRECTORY_MAX_PAGE_SIZE: u32 = 60;

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Gateway overrides
        if let Ok(v) = env::var("GATEWAY_ENDPOINT") {
            self.gateway.endpoint = v;
        }
        if let Ok(v) = env::var("GATEWAY_QUOTA_PLAN_ID") {
            self.gateway.quota_plan_id = v;
        }
        if let Ok(v) = env::var("GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = v.parse().unwrap_or(self.gateway.timeout_secs);
        }

        // Directory overrides
        if let Ok(v) = env::var("DIRECTORY_ENDPOINT") {
            self.directory.endpoint = v;
        }
        if let Ok(v) = env::var("DIRECTORY_USER_POOL_ID") {
            self.directory.user_pool_id = v;
        }
        if let Ok(v) = env::var("DIRECTORY_PAGE_SIZE") {
            self.directory.page_size = v
                .parse()
                .map(|n: u32| n.min(DIRECTORY_MAX_PAGE_SIZE))
                .unwrap_or(self.directory.page_size);
        }
        if let Ok(v) = env::var("DIRECTORY_TIMEOUT_SECS") {
            self.directory.timeout_secs = v.parse().unwrap_or(self.directory.timeout_secs);
        }

        // Billing overrides
        if let Ok(v) = env::var("BILLING_ENDPOINT") {
            self.billing.endpoint = v;
        }
        if let Ok(v) = env::var("BILLING_TIMEOUT_SECS") {
            self.billing.timeout_secs = v.parse().unwrap_or(self.billing.timeout_secs);
        }

        // Retention overrides
        if let Ok(v) = env::var("RETENTION_GRACE_PERIOD_DAYS") {
            self.retention.grace_period_days = v.parse().unwrap_or(self.retention.grace_period_days);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            gateway: GatewayConfig {
                endpoint: "http://localhost:4566/gateway".to_string(),
                quota_plan_id: "dev-quota-plan".to_string(),
                timeout_secs: 30,
            },
            directory: DirectoryConfig {
                endpoint: "http://localhost:4566/directory".to_string(),
                user_pool_id: "dev-pool".to_string(),
                page_size: DIRECTORY_MAX_PAGE_SIZE,
                timeout_secs: 30,
            },
            billing: BillingConfig {
                endpoint: "http://localhost:4566/billing".to_string(),
                timeout_secs: 30,
            },
            retention: RetentionConfig { grace_period_days: 90 },
            security: SecurityConfig {
                jwt_secret: "dev-secret-do-not-use".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            gateway: GatewayConfig {
                endpoint: "https://gateway.staging.example.com".to_string(),
                quota_plan_id: String::new(),
                timeout_secs: 10,
            },
            directory: DirectoryConfig {
                endpoint: "https://directory.staging.example.com".to_string(),
                user_pool_id: String::new(),
                page_size: DIRECTORY_MAX_PAGE_SIZE,
                timeout_secs: 10,
            },
            billing: BillingConfig {
                endpoint: "https://billing.staging.example.com".to_string(),
                timeout_secs: 10,
            },
            retention: RetentionConfig { grace_period_days: 90 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            gateway: GatewayConfig {
                endpoint: "https://gateway.example.com".to_string(),
                quota_plan_id: String::new(),
                timeout_secs: 10,
            },
            directory: DirectoryConfig {
                endpoint: "https://directory.example.com".to_string(),
                user_pool_id: String::new(),
                page_size: DIRECTORY_MAX_PAGE_SIZE,
                timeout_secs: 10,
            },
            billing: BillingConfig {
                endpoint: "https://billing.example.com".to_string(),
                timeout_secs: 10,
            },
            retention: RetentionConfig { grace_period_days: 90 },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}

// Global singleton config - initialized once at startup and handed to
// constructors; business logic never reads the environment ad hoc.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.directory.page_size, DIRECTORY_MAX_PAGE_SIZE);
        assert_eq!(config.retention.grace_period_days, 90);
        assert_eq!(config.gateway.timeout_secs, 30);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.security.jwt_expiry_hours, 4);
        assert_eq!(config.retention.grace_period_days, 90);
    }
}
