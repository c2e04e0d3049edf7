use std::{env, fmt, net::SocketAddr, time::Duration};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://handyneighbor.db?mode=rwc";
pub const DEFAULT_JWT_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_BCRYPT_COST: u32 = 10;
const DEV_JWT_SECRET: &str = "handyneighbor-development-secret";
const DEFAULT_GEOCODING_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/";
const DEFAULT_ADMIN_NAME: &str = "System Administrator";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the postal-code geocoder. Absent when no API key is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodingConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Admin account ensured at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub bcrypt_cost: u32,
    pub geocoding: Option<GeocodingConfig>,
    pub admin_seed: Option<AdminSeed>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_ttl", &self.jwt_ttl)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("geocoding", &self.geocoding.as_ref().map(|g| &g.base_url))
            .field("admin_seed", &self.admin_seed)
            .finish()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url = non_empty_var("DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret,
            None if matches!(environment, Environment::Production) => {
                return Err(ConfigError::MissingVar("JWT_SECRET"));
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let jwt_ttl_secs = parse_var("JWT_TTL_SECS", DEFAULT_JWT_TTL_SECS)?;
        if jwt_ttl_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "JWT_TTL_SECS",
                value: "0".to_string(),
            });
        }

        let bcrypt_cost = parse_var("BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::BcryptCost(bcrypt_cost));
        }

        let geocoding = non_empty_var("GEOCODING_API_KEY").map(|api_key| GeocodingConfig {
            api_key,
            base_url: non_empty_var("GEOCODING_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEOCODING_BASE_URL.to_string()),
        });

        let admin_seed = match (non_empty_var("ADMIN_EMAIL"), non_empty_var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                full_name: non_empty_var("ADMIN_FULL_NAME")
                    .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteAdminSeed),
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            jwt_secret,
            jwt_ttl: Duration::from_secs(jwt_ttl_secs),
            bcrypt_cost,
            geocoding,
            admin_seed,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidNumber { name: &'static str, value: String },
    BcryptCost(u32),
    IncompleteAdminSeed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "{name} must be set in production"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got {value})")
            }
            Self::BcryptCost(cost) => write!(f, "BCRYPT_COST must be between 4 and 31 (got {cost})"),
            Self::IncompleteAdminSeed => {
                write!(f, "ADMIN_EMAIL and ADMIN_PASSWORD must be set together")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
