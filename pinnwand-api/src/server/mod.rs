use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use pinnwand_common::model::auth::{
    AccessTokenDecodeError, PasswordHashError, TokenSigner, TokenVerifyError,
};
use pinnwand_db::client::{DbClient, DbError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod auth;
mod cache;
mod json;
mod routes;

pub use cache::PostCache;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub token_signer: Arc<TokenSigner>,
    pub post_cache: Arc<PostCache>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    TokenDecode(#[from] AccessTokenDecodeError),
    #[error("The provided auth token was rejected: {0}")]
    TokenVerify(#[from] TokenVerifyError),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("The password could not be hashed: {0}")]
    PasswordHash(#[from] PasswordHashError),
    #[error("Post not found")]
    PostNotFound,
    #[error(transparent)]
    Database(DbError),
}

impl From<DbError> for ServerError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::DuplicateEmail => Self::DuplicateEmail,
            other => Self::Database(other),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostNotFound => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::TokenDecode(_)
            | ServerError::TokenVerify(_)
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::JsonRejection(_) | ServerError::DuplicateEmail => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        // Internal details stay in the logs.
        let error = if status.is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use pinnwand_common::model::auth::TokenVerifyError;
    use pinnwand_db::client::DbError;

    #[test]
    fn duplicate_email_maps_to_bad_request() {
        let error = ServerError::from(DbError::DuplicateEmail);

        assert!(matches!(error, ServerError::DuplicateEmail));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn token_failures_map_to_unauthorized() {
        for error in [
            ServerError::TokenVerify(TokenVerifyError::BadSignature),
            ServerError::TokenVerify(TokenVerifyError::Expired),
            ServerError::InvalidCredentials,
        ] {
            assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn missing_post_and_foreign_post_share_one_error() {
        // The handler maps both cases to PostNotFound, so callers cannot
        // probe for other users' posts.
        assert_eq!(ServerError::PostNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::PostNotFound.to_string(), "Post not found");
    }

    #[test]
    fn transient_database_failures_map_to_server_error() {
        let error = ServerError::from(DbError::Sqlx(sqlx::Error::PoolTimedOut));

        assert!(matches!(error, ServerError::Database(_)));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
