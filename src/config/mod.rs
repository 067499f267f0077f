use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub security: SecurityConfig,
    pub rate_limits: RateLimitConfig,
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Boundary-check tunables. Thresholds are enforced by the guard, never
/// hard-coded at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub break_glass_duration_minutes: i64,
    pub enumeration_threshold: u64,
    pub enumeration_window_secs: u64,
    pub permission_cleanup_interval_secs: u64,
}

/// One sliding-window policy per endpoint class. The limiter algorithm is
/// policy-agnostic; these are just the observed defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub auth: RateLimitPolicyConfig,
    pub api: RateLimitPolicyConfig,
    pub admin: RateLimitPolicyConfig,
    pub uploads: RateLimitPolicyConfig,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitPolicyConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPolicyConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub invitation_expiry_days: i64,
    pub slug_max_attempts: u32,
}

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
        // Security overrides
        if let Ok(v) = env::var("SECURITY_BREAK_GLASS_DURATION_MINUTES") {
            self.security.break_glass_duration_minutes =
                v.parse().unwrap_or(self.security.break_glass_duration_minutes);
        }
        if let Ok(v) = env::var("SECURITY_ENUMERATION_THRESHOLD") {
            self.security.enumeration_threshold =
                v.parse().unwrap_or(self.security.enumeration_threshold);
        }
        if let Ok(v) = env::var("SECURITY_ENUMERATION_WINDOW_SECS") {
            self.security.enumeration_window_secs =
                v.parse().unwrap_or(self.security.enumeration_window_secs);
        }
        if let Ok(v) = env::var("SECURITY_PERMISSION_CLEANUP_INTERVAL_SECS") {
            self.security.permission_cleanup_interval_secs = v
                .parse()
                .unwrap_or(self.security.permission_cleanup_interval_secs);
        }

        // Rate limit overrides, one pair per endpoint class
        if let Ok(v) = env::var("RATE_LIMIT_AUTH_REQUESTS") {
            self.rate_limits.auth.max_requests = v.parse().unwrap_or(self.rate_limits.auth.max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_AUTH_WINDOW_SECS") {
            self.rate_limits.auth.window_secs = v.parse().unwrap_or(self.rate_limits.auth.window_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_API_REQUESTS") {
            self.rate_limits.api.max_requests = v.parse().unwrap_or(self.rate_limits.api.max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_API_WINDOW_SECS") {
            self.rate_limits.api.window_secs = v.parse().unwrap_or(self.rate_limits.api.window_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_ADMIN_REQUESTS") {
            self.rate_limits.admin.max_requests =
                v.parse().unwrap_or(self.rate_limits.admin.max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_ADMIN_WINDOW_SECS") {
            self.rate_limits.admin.window_secs =
                v.parse().unwrap_or(self.rate_limits.admin.window_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_UPLOADS_REQUESTS") {
            self.rate_limits.uploads.max_requests =
                v.parse().unwrap_or(self.rate_limits.uploads.max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_UPLOADS_WINDOW_SECS") {
            self.rate_limits.uploads.window_secs =
                v.parse().unwrap_or(self.rate_limits.uploads.window_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            self.rate_limits.sweep_interval_secs =
                v.parse().unwrap_or(self.rate_limits.sweep_interval_secs);
        }

        // Provisioning overrides
        if let Ok(v) = env::var("PROVISIONING_INVITATION_EXPIRY_DAYS") {
            self.provisioning.invitation_expiry_days =
                v.parse().unwrap_or(self.provisioning.invitation_expiry_days);
        }
        if let Ok(v) = env::var("PROVISIONING_SLUG_MAX_ATTEMPTS") {
            self.provisioning.slug_max_attempts =
                v.parse().unwrap_or(self.provisioning.slug_max_attempts);
        }

        self
    }

    fn base(environment: Environment) -> Self {
        Self {
            environment,
            security: SecurityConfig {
                break_glass_duration_minutes: 60,
                enumeration_threshold: 50,
                enumeration_window_secs: 300,
                permission_cleanup_interval_secs: 300,
            },
            rate_limits: RateLimitConfig {
                auth: RateLimitPolicyConfig { max_requests: 5, window_secs: 15 * 60 },
                api: RateLimitPolicyConfig { max_requests: 100, window_secs: 60 },
                admin: RateLimitPolicyConfig { max_requests: 1000, window_secs: 60 * 60 },
                uploads: RateLimitPolicyConfig { max_requests: 10, window_secs: 60 * 60 },
                sweep_interval_secs: 60,
            },
            provisioning: ProvisioningConfig {
                invitation_expiry_days: 7,
                slug_max_attempts: 20,
            },
        }
    }

    fn development() -> Self {
        let mut cfg = Self::base(Environment::Development);
        // Generous limits so local iteration never trips the throttles
        cfg.rate_limits.api.max_requests = 1000;
        cfg.security.enumeration_threshold = 500;
        cfg
    }

    fn staging() -> Self {
        Self::base(Environment::Staging)
    }

    fn production() -> Self {
        Self::base(Environment::Production)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.security.break_glass_duration_minutes, 60);
        assert_eq!(config.security.enumeration_threshold, 50);
        assert_eq!(config.rate_limits.auth.max_requests, 5);
        assert_eq!(config.rate_limits.auth.window_secs, 900);
        assert_eq!(config.rate_limits.api.max_requests, 100);
        assert_eq!(config.rate_limits.admin.window_secs, 3600);
        assert_eq!(config.provisioning.invitation_expiry_days, 7);
    }

    #[test]
    fn test_development_relaxes_throttles() {
        let config = AppConfig::development();
        assert!(config.rate_limits.api.max_requests > AppConfig::production().rate_limits.api.max_requests);
        assert!(config.security.enumeration_threshold > 50);
    }
}
