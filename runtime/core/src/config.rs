// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Runtime Configuration
//
// Environment-driven settings with defaults suitable for development.
// Container deployments override via `AGORA_*` environment variables.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// Bind address for the HTTP surface.
    pub http_addr: String,
    pub auth: AuthSettings,
    pub bus: BusSettings,
    pub agents: AgentDefaults,
    pub worker: WorkerSettings,
    /// Gates the passwordless development login endpoint.
    pub enable_dev_login: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_days: i64,
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub cookie_same_site: String,
    pub service_token: Option<String>,
    pub service_scopes: Vec<String>,
    /// When set, a replayed (already-rotated) refresh secret cascade-revokes
    /// the whole session instead of only being rejected.
    pub revoke_session_on_replay: bool,
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    pub nats_url: String,
    pub stream_name: String,
}

#[derive(Debug, Clone)]
pub struct AgentDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_in_flight: usize,
    pub idle_heartbeat: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/agora".to_string(),
            http_addr: "127.0.0.1:8080".to_string(),
            auth: AuthSettings {
                jwt_secret: String::new(),
                access_ttl_seconds: 900,
                refresh_ttl_days: 30,
                cookie_name: "agora_refresh".to_string(),
                cookie_domain: None,
                cookie_secure: false,
                cookie_same_site: "lax".to_string(),
                service_token: None,
                service_scopes: Vec::new(),
                revoke_session_on_replay: false,
            },
            bus: BusSettings {
                nats_url: "nats://127.0.0.1:4222".to_string(),
                stream_name: "AGORA".to_string(),
            },
            agents: AgentDefaults {
                model: "gemini-2.0-flash".to_string(),
                temperature: 0.7,
                max_tokens: 2000,
                max_retries: 3,
                retry_delay: Duration::from_millis(1000),
                timeout: Duration::from_millis(30_000),
                gemini_api_key: None,
            },
            worker: WorkerSettings {
                max_in_flight: 10,
                idle_heartbeat: Duration::from_millis(5000),
            },
            enable_dev_login: false,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut settings = Self::default();
        settings.apply_env_overrides()?;
        if settings.auth.jwt_secret.is_empty() {
            anyhow::bail!("AGORA_JWT_SECRET must be set");
        }
        Ok(settings)
    }

    /// Apply environment variable overrides. This allows container
    /// deployments to override config via env vars.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("AGORA_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var("AGORA_HTTP_ADDR") {
            self.http_addr = v;
        }
        if let Ok(v) = std::env::var("AGORA_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Ok(v) = std::env::var("AGORA_ACCESS_TOKEN_TTL_SECONDS") {
            self.auth.access_ttl_seconds = parse(&v, "AGORA_ACCESS_TOKEN_TTL_SECONDS")?;
        }
        if let Ok(v) = std::env::var("AGORA_REFRESH_TOKEN_TTL_DAYS") {
            self.auth.refresh_ttl_days = parse(&v, "AGORA_REFRESH_TOKEN_TTL_DAYS")?;
        }
        if let Ok(v) = std::env::var("AGORA_AUTH_COOKIE_NAME") {
            self.auth.cookie_name = v;
        }
        if let Ok(v) = std::env::var("AGORA_AUTH_COOKIE_DOMAIN") {
            let trimmed = v.trim().to_string();
            self.auth.cookie_domain = (!trimmed.is_empty()).then_some(trimmed);
        }
        if let Ok(v) = std::env::var("AGORA_AUTH_COOKIE_SECURE") {
            self.auth.cookie_secure = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("AGORA_AUTH_COOKIE_SAMESITE") {
            self.auth.cookie_same_site = v;
        }
        if let Ok(v) = std::env::var("AGORA_SERVICE_TOKEN") {
            self.auth.service_token = Some(v);
        }
        if let Ok(v) = std::env::var("AGORA_SERVICE_SCOPES") {
            self.auth.service_scopes = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("AGORA_REVOKE_SESSION_ON_REFRESH_REPLAY") {
            self.auth.revoke_session_on_replay = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("AGORA_NATS_URL") {
            self.bus.nats_url = v;
        }
        if let Ok(v) = std::env::var("AGORA_STREAM_NAME") {
            self.bus.stream_name = v;
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_MODEL") {
            self.agents.model = v;
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_TEMPERATURE") {
            self.agents.temperature = parse(&v, "AGORA_AGENT_TEMPERATURE")?;
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_MAX_TOKENS") {
            self.agents.max_tokens = parse(&v, "AGORA_AGENT_MAX_TOKENS")?;
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_MAX_RETRIES") {
            self.agents.max_retries = parse(&v, "AGORA_AGENT_MAX_RETRIES")?;
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_RETRY_DELAY_MS") {
            self.agents.retry_delay = Duration::from_millis(parse(&v, "AGORA_AGENT_RETRY_DELAY_MS")?);
        }
        if let Ok(v) = std::env::var("AGORA_AGENT_TIMEOUT_MS") {
            self.agents.timeout = Duration::from_millis(parse(&v, "AGORA_AGENT_TIMEOUT_MS")?);
        }
        if let Ok(v) = std::env::var("AGORA_GEMINI_API_KEY") {
            self.agents.gemini_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("AGORA_WORKER_MAX_IN_FLIGHT") {
            self.worker.max_in_flight = parse(&v, "AGORA_WORKER_MAX_IN_FLIGHT")?;
        }
        if let Ok(v) = std::env::var("AGORA_WORKER_HEARTBEAT_MS") {
            self.worker.idle_heartbeat = Duration::from_millis(parse(&v, "AGORA_WORKER_HEARTBEAT_MS")?);
        }
        if let Ok(v) = std::env::var("AGORA_ENABLE_DEV_LOGIN") {
            self.enable_dev_login = parse_bool(&v);
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", name, e))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.auth.access_ttl_seconds, 900);
        assert_eq!(settings.auth.refresh_ttl_days, 30);
        assert_eq!(settings.agents.max_retries, 3);
        assert_eq!(settings.agents.timeout, Duration::from_secs(30));
        assert_eq!(settings.worker.max_in_flight, 10);
        assert!(!settings.auth.revoke_session_on_replay);
    }

    #[test]
    fn test_parse_bool_accepts_common_forms() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("YES"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("off"));
    }
}
