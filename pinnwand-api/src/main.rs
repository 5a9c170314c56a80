use crate::server::{PostCache, ServerState};
use base64::{DecodeError, Engine, prelude::BASE64_STANDARD};
use pinnwand_common::{
    model::auth::{TOKEN_KEY_LEN, TokenSigner},
    util::PositiveDuration,
};
use pinnwand_db::client::DbClient;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("TOKEN_SECRET is not valid base64: {0}")]
    TokenSecretDecode(#[from] DecodeError),
    #[error("TOKEN_SECRET must decode to {TOKEN_KEY_LEN} bytes, got {0}")]
    TokenSecretLength(usize),
    #[error("TOKEN_TTL_SECONDS must be positive")]
    NonPositiveTokenTtl,
    #[error("Error connecting to the database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    /// Base64 of the 32 byte HMAC key used to sign access tokens.
    token_secret: String,
    #[serde(default = "default_token_ttl_seconds")]
    token_ttl_seconds: i64,
    #[serde(default = "default_post_cache_ttl_seconds")]
    post_cache_ttl_seconds: u64,
    #[serde(default = "default_post_cache_capacity")]
    post_cache_capacity: usize,
}

fn default_token_ttl_seconds() -> i64 {
    60 * 60 * 24
}

fn default_post_cache_ttl_seconds() -> u64 {
    300
}

fn default_post_cache_capacity() -> usize {
    100
}

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pinnwand_api=debug,pinnwand_common=debug,pinnwand_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn token_signer(env: &Env) -> Result<TokenSigner, InitError> {
    let key: [u8; TOKEN_KEY_LEN] = BASE64_STANDARD
        .decode(&env.token_secret)?
        .try_into()
        .map_err(|bytes: Vec<u8>| InitError::TokenSecretLength(bytes.len()))?;
    let ttl = PositiveDuration::new(time::Duration::seconds(env.token_ttl_seconds))
        .ok_or(InitError::NonPositiveTokenTtl)?;

    Ok(TokenSigner::new(key, ttl))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Installing ctrl-c handler failed");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let token_signer = Arc::new(token_signer(&env)?);

    // Bounded acquire timeout so store calls surface transient failures
    // instead of hanging.
    let pool = PgPoolOptions::new()
        .acquire_timeout(DB_ACQUIRE_TIMEOUT)
        .connect(&env.database_url)
        .await?;
    let db_client = Arc::new(DbClient::new(pool));

    let post_cache = Arc::new(PostCache::new(
        env.post_cache_capacity,
        Duration::from_secs(env.post_cache_ttl_seconds),
    ));

    let state = ServerState {
        db_client,
        token_signer,
        post_cache,
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().with_state(state).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
