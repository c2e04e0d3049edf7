mod accounts;
mod admin;
mod auth;
mod problem;
mod router;
mod seed;
mod tasks;
mod telemetry;

use std::{net::SocketAddr, time::Duration};

use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use handy_geocode::GeocodingClient;
use handy_storage::Database;
use handy_util::{load_env_file, AppConfig};

const GEOCODING_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "app", "database ready");

    let passwords = auth::PasswordHasher::new(config.bcrypt_cost);
    match &config.admin_seed {
        Some(admin) => {
            seed::ensure_admin(&database, &passwords, admin, Utc::now()).await?;
        }
        None => warn!(stage = "app", "ADMIN_EMAIL not set; skipping admin seeding"),
    }

    let geocoder = match &config.geocoding {
        Some(geocoding) => {
            let base_url = Url::parse(&geocoding.base_url)?;
            let http = reqwest::Client::builder()
                .timeout(GEOCODING_TIMEOUT)
                .build()?;
            Some(GeocodingClient::new(geocoding.api_key.clone(), base_url, http))
        }
        None => {
            warn!(
                stage = "app",
                "GEOCODING_API_KEY not set; tasks must be created with explicit coordinates"
            );
            None
        }
    };

    let tokens = auth::TokenService::new(config.jwt_secret.as_bytes(), config.jwt_ttl);
    let state = router::AppState::new(metrics, database, tokens, passwords, geocoder);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
