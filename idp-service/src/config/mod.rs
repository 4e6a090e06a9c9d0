use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IdpConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Public origin used as the OIDC issuer. Derived from the Host header when unset.
    pub origin: Option<String>,
    pub redis: RedisConfig,
    pub cert: BuiltInCertConfig,
    pub policy: PolicyConfig,
    pub seed_path: Option<String>,
    pub ldap: LdapConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Tokens and codes live in memory when no URL is configured.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuiltInCertConfig {
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub key_bits: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Extra `p, ...` rules appended to the built-in table.
    pub rules_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub token_attempts: u32,
    pub token_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl IdpConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdpConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("idp-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTEL_EXPORTER_OTLP_ENDPOINT"),
            origin: get_optional_env("ORIGIN"),
            redis: RedisConfig {
                url: get_optional_env("REDIS_URL"),
            },
            cert: BuiltInCertConfig {
                private_key_path: get_optional_env("BUILTIN_CERT_PRIVATE_KEY_PATH"),
                public_key_path: get_optional_env("BUILTIN_CERT_PUBLIC_KEY_PATH"),
                key_bits: get_env("BUILTIN_CERT_KEY_BITS", Some("2048"), false)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            policy: PolicyConfig {
                rules_path: get_optional_env("POLICY_FILE"),
            },
            seed_path: get_optional_env("SEED_FILE"),
            ldap: LdapConfig {
                timeout_seconds: get_env("LDAP_TIMEOUT_SECONDS", Some("5"), false)?
                    .parse()
                    .unwrap_or(5),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                token_attempts: get_env("RATE_LIMIT_TOKEN_ATTEMPTS", Some("30"), false)?
                    .parse()
                    .unwrap_or(30),
                token_window_seconds: get_env(
                    "RATE_LIMIT_TOKEN_WINDOW_SECONDS",
                    Some("60"),
                    false,
                )?
                .parse()
                .unwrap_or(60),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), false)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    false,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.cert.key_bits < 2048 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BUILTIN_CERT_KEY_BITS must be at least 2048"
            )));
        }

        if self.cert.private_key_path.is_some() != self.cert.public_key_path.is_some() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BUILTIN_CERT_PRIVATE_KEY_PATH and BUILTIN_CERT_PUBLIC_KEY_PATH must be set together"
            )));
        }

        if let Some(origin) = &self.origin {
            url::Url::parse(origin).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("ORIGIN is not a valid URL: {}", e))
            })?;
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            // A generated key would change on every restart and invalidate issued tokens.
            if self.cert.private_key_path.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "BUILTIN_CERT_PRIVATE_KEY_PATH is required in production"
                )));
            }

            if self.redis.url.is_none() {
                tracing::warn!("REDIS_URL not set in production; tokens will not survive restarts");
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }

    pub fn swagger_enabled(&self) -> bool {
        match self.environment {
            Environment::Dev => true,
            Environment::Prod => !matches!(self.swagger.enabled, SwaggerMode::Disabled),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> IdpConfig {
        IdpConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "idp-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            origin: None,
            redis: RedisConfig { url: None },
            cert: BuiltInCertConfig {
                private_key_path: None,
                public_key_path: None,
                key_bits: 2048,
            },
            policy: PolicyConfig { rules_path: None },
            seed_path: None,
            ldap: LdapConfig { timeout_seconds: 5 },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            swagger: SwaggerConfig {
                enabled: SwaggerMode::Public,
            },
            rate_limit: RateLimitConfig {
                token_attempts: 30,
                token_window_seconds: 60,
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("disabled".parse::<SwaggerMode>(), Ok(SwaggerMode::Disabled));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_dev_config_is_valid() {
        assert!(dev_config().validate().is_ok());
    }

    #[test]
    fn test_half_configured_cert_rejected() {
        let mut config = dev_config();
        config.cert.private_key_path = Some("/tmp/key.pem".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prod_requires_cert_and_rejects_wildcard_cors() {
        let mut config = dev_config();
        config.environment = Environment::Prod;
        assert!(config.validate().is_err());

        config.cert.private_key_path = Some("/keys/private.pem".to_string());
        config.cert.public_key_path = Some("/keys/public.pem".to_string());
        assert!(config.validate().is_ok());

        config.security.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let mut config = dev_config();
        config.origin = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }
}
