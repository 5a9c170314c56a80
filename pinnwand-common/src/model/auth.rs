use crate::{
    model::{
        Id,
        user::{Password, UserMarker},
    },
    util::PositiveDuration,
};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHashString, SaltString, rand_core::OsRng},
};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const TOKEN_KEY_LEN: usize = 32;
/// HMAC-SHA256 output length.
pub const TOKEN_SIGNATURE_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing the password failed: {0}")]
pub struct PasswordHashError(argon2::password_hash::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AccessTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the signature part is incorrect")]
    InvalidSignatureLength,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum TokenVerifyError {
    #[error("The token signature does not match")]
    BadSignature,
    #[error("The token has expired")]
    Expired,
}

/// Self-contained bearer token: the signature covers the user id and both
/// timestamps, so verification needs no server-side state.
///
/// Wire format: `{user_id}:{issued_at}:{expires_at}:{base64(signature)}`,
/// timestamps as unix seconds.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AccessToken {
    pub user_id: Id<UserMarker>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub signature: [u8; TOKEN_SIGNATURE_LEN],
}

impl AccessToken {
    #[must_use]
    pub fn as_token_str(&self) -> String {
        let signing_input = self.signing_input();
        let encoded_signature = Base64Display::new(&self.signature, &BASE64_STANDARD);

        format!("{signing_input}:{encoded_signature}")
    }

    fn signing_input(&self) -> String {
        let user_id = self.user_id;
        let issued_at = self.issued_at;
        let expires_at = self.expires_at;

        format!("{user_id}:{issued_at}:{expires_at}")
    }
}

impl FromStr for AccessToken {
    type Err = AccessTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let issued_at_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let expires_at_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let signature_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = i64::from_str(user_id_part)
            .map_err(Self::Err::InvalidUserId)?
            .into();
        let issued_at = i64::from_str(issued_at_part).map_err(Self::Err::InvalidTimestamp)?;
        let expires_at = i64::from_str(expires_at_part).map_err(Self::Err::InvalidTimestamp)?;
        let signature = BASE64_STANDARD
            .decode(signature_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSignatureLength)?;

        Ok(Self {
            user_id,
            issued_at,
            expires_at,
            signature,
        })
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("signature", &"[redacted]")
            .finish()
    }
}

/// Issues and verifies [`AccessToken`]s with a server-held HMAC-SHA256 key.
#[derive(Clone, Eq, PartialEq)]
pub struct TokenSigner {
    key: [u8; TOKEN_KEY_LEN],
    ttl: PositiveDuration,
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: [u8; TOKEN_KEY_LEN], ttl: PositiveDuration) -> Self {
        Self { key, ttl }
    }

    #[must_use]
    pub fn issue(&self, user_id: Id<UserMarker>) -> AccessToken {
        self.issue_at(user_id, UtcDateTime::now())
    }

    #[must_use]
    pub fn issue_at(&self, user_id: Id<UserMarker>, issued_at: UtcDateTime) -> AccessToken {
        let issued_at = issued_at.unix_timestamp();
        let expires_at = issued_at + self.ttl.get().whole_seconds();

        let mut token = AccessToken {
            user_id,
            issued_at,
            expires_at,
            signature: [0; TOKEN_SIGNATURE_LEN],
        };
        token.signature = self.mac(&token).finalize().into_bytes().into();

        token
    }

    pub fn verify(&self, token: &AccessToken) -> Result<Id<UserMarker>, TokenVerifyError> {
        self.verify_at(token, UtcDateTime::now())
    }

    /// Fails closed: the signature is checked (in constant time) before the
    /// expiry, and any failure yields an error rather than an identity.
    pub fn verify_at(
        &self,
        token: &AccessToken,
        now: UtcDateTime,
    ) -> Result<Id<UserMarker>, TokenVerifyError> {
        self.mac(token)
            .verify_slice(&token.signature)
            .map_err(|_| TokenVerifyError::BadSignature)?;

        if token.expires_at <= now.unix_timestamp() {
            return Err(TokenVerifyError::Expired);
        }

        Ok(token.user_id)
    }

    fn mac(&self, token: &AccessToken) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(token.signing_input().as_bytes());
        mac
    }
}

impl Debug for TokenSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key", &"[redacted]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password hash is not a valid PHC string")]
pub struct InvalidPasswordHashError;

/// What the credential store hands back for a login attempt.
#[derive(Clone)]
pub struct UserCredentials {
    pub id: Id<UserMarker>,
    pub password_hash: PasswordHashString,
}

impl Debug for UserCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("id", &self.id)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

/// Salted argon2 hash in PHC string format, suitable for storage.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.get().as_bytes(), &salt)
        .map_err(PasswordHashError)?;

    Ok(hash.serialize())
}

/// Constant-time verification against the stored hash. Malformed stored
/// hashes count as a mismatch.
#[must_use]
pub fn verify_password(password: &Password, hash: &PasswordHashString) -> bool {
    Argon2::default()
        .verify_password(password.get().as_bytes(), &hash.password_hash())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            auth::{
                AccessToken, TOKEN_KEY_LEN, TokenSigner, TokenVerifyError, hash_password,
                verify_password,
            },
            user::{Password, UserMarker},
        },
        util::PositiveDuration,
    };
    use std::str::FromStr;
    use time::{Duration, macros::utc_datetime};

    fn signer(key_byte: u8) -> TokenSigner {
        TokenSigner::new(
            [key_byte; TOKEN_KEY_LEN],
            PositiveDuration::new_unchecked(Duration::hours(1)),
        )
    }

    #[test]
    fn issue_verify_round_trip() {
        let signer = signer(1);
        let user_id = Id::<UserMarker>::new(42);
        let issued_at = utc_datetime!(2025-06-01 12:00);

        let token = signer.issue_at(user_id, issued_at);
        let reparsed = AccessToken::from_str(&token.as_token_str()).unwrap();

        assert_eq!(reparsed, token);
        assert_eq!(signer.verify_at(&reparsed, issued_at), Ok(user_id));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = signer(1);
        let issued_at = utc_datetime!(2025-06-01 12:00);

        let token = signer.issue_at(Id::new(42), issued_at);

        assert_eq!(
            signer.verify_at(&token, issued_at + Duration::hours(1)),
            Err(TokenVerifyError::Expired)
        );
        assert_eq!(
            signer.verify_at(&token, issued_at + Duration::minutes(59)),
            Ok(Id::new(42))
        );
    }

    #[test]
    fn tampered_user_id_is_rejected() {
        let signer = signer(1);
        let issued_at = utc_datetime!(2025-06-01 12:00);

        let mut token = signer.issue_at(Id::new(42), issued_at);
        token.user_id = Id::new(43);

        assert_eq!(
            signer.verify_at(&token, issued_at),
            Err(TokenVerifyError::BadSignature)
        );
    }

    #[test]
    fn tampered_expiry_is_rejected() {
        let signer = signer(1);
        let issued_at = utc_datetime!(2025-06-01 12:00);

        let mut token = signer.issue_at(Id::new(42), issued_at);
        token.expires_at += 3600;

        assert_eq!(
            signer.verify_at(&token, issued_at),
            Err(TokenVerifyError::BadSignature)
        );
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let issued_at = utc_datetime!(2025-06-01 12:00);
        let token = signer(1).issue_at(Id::new(42), issued_at);

        assert_eq!(
            signer(2).verify_at(&token, issued_at),
            Err(TokenVerifyError::BadSignature)
        );
    }

    #[test]
    fn malformed_token_strings_are_rejected() {
        let malformed = [
            "",
            "42",
            "42:0:100",
            "not-a-number:0:100:AAAA",
            "42:zero:100:AAAA",
            "42:0:100:not base64!",
            "42:0:100:AAAA",
        ];

        for s in malformed {
            assert!(AccessToken::from_str(s).is_err(), "accepted: {s:?}");
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let password = Password::new("hunter2".to_owned());
        let hash = hash_password(&password).unwrap();

        assert!(verify_password(&password, &hash));
        assert!(!verify_password(&Password::new("hunter3".to_owned()), &hash));
    }

    #[test]
    fn password_hashes_are_salted() {
        let password = Password::new("hunter2".to_owned());

        let first = hash_password(&password).unwrap();
        let second = hash_password(&password).unwrap();

        assert_ne!(first.as_str(), second.as_str());
    }
}
