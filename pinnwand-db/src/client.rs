use crate::record::{PostRecord, UserCredentialsRecord};
use pinnwand_common::model::{
    Id, ModelValidationError,
    auth::UserCredentials,
    post::{Post, PostMarker, PostText},
    user::{EmailAddress, UserMarker},
};
use sqlx::PgPool;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("The email address is already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Relies on the unique index on `users.email` for atomicity; concurrent
    /// signups with the same address race inside the database, not here.
    pub async fn create_user(
        &self,
        email: &EmailAddress,
        password_hash: &str,
    ) -> Result<Id<UserMarker>> {
        let user_id = sqlx::query_scalar::<_, i64>(
            "
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING user_id
            ",
        )
        .bind(email.get())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::DuplicateEmail
            }
            _ => DbError::Sqlx(err),
        })?;

        Ok(user_id.into())
    }

    pub async fn fetch_user_credentials(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "
            SELECT user_id, password_hash
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    pub async fn create_post(
        &self,
        owner: Id<UserMarker>,
        text: &PostText,
    ) -> Result<Id<PostMarker>> {
        let post_id = sqlx::query_scalar::<_, i64>(
            "
            INSERT INTO posts (user_id, text)
            VALUES ($1, $2)
            RETURNING post_id
            ",
        )
        .bind(owner.get())
        .bind(text.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    pub async fn fetch_user_posts(&self, owner: Id<UserMarker>) -> Result<Vec<Post>> {
        let records = sqlx::query_as::<_, PostRecord>(
            "
            SELECT post_id, user_id, text, created_at
            FROM posts
            WHERE user_id = $1
            ORDER BY post_id
            ",
        )
        .bind(owner.get())
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    /// Scoped delete: the owner predicate is part of the statement, so
    /// authorization and deletion are one atomic operation. Returns whether a
    /// row was deleted; a missing post and a post owned by someone else are
    /// indistinguishable.
    pub async fn delete_post(
        &self,
        post_id: Id<PostMarker>,
        owner: Id<UserMarker>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "
            DELETE FROM posts
            WHERE post_id = $1 AND user_id = $2
            ",
        )
        .bind(post_id.get())
        .bind(owner.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
