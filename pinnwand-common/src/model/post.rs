use crate::model::{Id, user::UserMarker};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

/// 1 MiB, measured in bytes of the UTF-8 text.
pub const POST_TEXT_MAX_LEN: usize = 1_048_576;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub owner: Id<UserMarker>,
    pub text: PostText,
    pub created_at: UtcDateTime,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
pub enum InvalidPostTextError {
    #[default]
    #[error("The post text is empty")]
    Empty,
    #[error("The post text exceeds {POST_TEXT_MAX_LEN} bytes: {0}")]
    TooLong(usize),
}

impl PostText {
    pub fn new(text: String) -> Result<Self, InvalidPostTextError> {
        if text.is_empty() {
            Err(InvalidPostTextError::Empty)
        } else if text.len() > POST_TEXT_MAX_LEN {
            Err(InvalidPostTextError::TooLong(text.len()))
        } else {
            Ok(PostText(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostText::new(inner).map_err(|err| match err {
            InvalidPostTextError::Empty => {
                Error::invalid_value(Unexpected::Str(""), &"non-empty PostText")
            }
            InvalidPostTextError::TooLong(len) => Error::invalid_length(len, &"PostText"),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{InvalidPostTextError, POST_TEXT_MAX_LEN, PostText};

    #[test]
    fn text_at_byte_limit_is_accepted() {
        let text = "a".repeat(POST_TEXT_MAX_LEN);
        assert!(PostText::new(text).is_ok());
    }

    #[test]
    fn text_over_byte_limit_is_rejected() {
        let text = "a".repeat(POST_TEXT_MAX_LEN + 1);
        assert_eq!(
            PostText::new(text),
            Err(InvalidPostTextError::TooLong(POST_TEXT_MAX_LEN + 1))
        );
    }

    #[test]
    fn empty_text_is_rejected() {
        assert_eq!(
            PostText::new(String::new()),
            Err(InvalidPostTextError::Empty)
        );
    }

    #[test]
    fn limit_counts_bytes_not_chars() {
        // Four bytes per char, so a quarter of the limit in chars fits exactly.
        let text = "\u{1F980}".repeat(POST_TEXT_MAX_LEN / 4);
        assert!(PostText::new(text).is_ok());

        let text = "\u{1F980}".repeat(POST_TEXT_MAX_LEN / 4 + 1);
        assert!(PostText::new(text).is_err());
    }
}
