use pinnwand_common::model::{
    ModelValidationError,
    auth::{InvalidPasswordHashError, UserCredentials},
    post::{Post, PostText},
};
use sqlx::prelude::FromRow;
use time::PrimitiveDateTime;

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct UserCredentialsRecord {
    pub user_id: i64,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: PrimitiveDateTime,
}

impl TryFrom<UserCredentialsRecord> for UserCredentials {
    type Error = ModelValidationError;

    fn try_from(value: UserCredentialsRecord) -> Result<Self, Self::Error> {
        let password_hash = value
            .password_hash
            .parse()
            .map_err(|_| InvalidPasswordHashError)?;

        Ok(Self {
            id: value.user_id.into(),
            password_hash,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_id.into(),
            owner: value.user_id.into(),
            text: PostText::new(value.text)?,
            created_at: value.created_at.as_utc(),
        })
    }
}
