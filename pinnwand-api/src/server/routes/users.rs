use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use pinnwand_common::model::{
    auth::{TokenSigner, hash_password, verify_password},
    user::Credentials,
};
use pinnwand_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(signup).typed_post(login)
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/signup", rejection(ServerError))]
struct SignupPath();

/// Email uniqueness is enforced by the store, not checked up front; a
/// concurrent duplicate signup loses the race inside the database and
/// surfaces here as `DuplicateEmail`.
async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    State(signer): State<Arc<TokenSigner>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenResponse>> {
    let password_hash = hash_password(&credentials.password)?;
    let user_id = db
        .create_user(&credentials.email, password_hash.as_str())
        .await?;

    let token = signer.issue(user_id);

    Ok(Json(TokenResponse {
        token: token.as_token_str(),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/login", rejection(ServerError))]
struct LoginPath();

/// Unknown email and wrong password produce the same response.
async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(signer): State<Arc<TokenSigner>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenResponse>> {
    let user = db
        .fetch_user_credentials(&credentials.email)
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !verify_password(&credentials.password, &user.password_hash) {
        return Err(ServerError::InvalidCredentials);
    }

    let token = signer.issue(user.id);

    Ok(Json(TokenResponse {
        token: token.as_token_str(),
    }))
}
