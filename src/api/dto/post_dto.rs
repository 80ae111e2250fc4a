//! Post DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ServiceError;
use crate::persistence::statements::VARCHAR_WIDTH;
use crate::persistence::{NewPost, Post};

/// Request body for `POST /posts`.
///
/// Absent and `null` fields are accepted here and rejected by
/// [`CreatePostRequest::validate`], so both produce the same error.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    /// Post title.
    #[serde(default)]
    pub title: Option<String>,
    /// Post body.
    #[serde(default)]
    pub content: Option<String>,
    /// Author of the post.
    #[serde(default)]
    pub username: Option<String>,
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn is_too_wide(value: Option<&String>) -> bool {
    value.is_some_and(|v| v.chars().count() > VARCHAR_WIDTH)
}

impl CreatePostRequest {
    /// Parses a raw request body.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::EmptyBody`] if `body` is empty.
    /// - [`ServiceError::MalformedBody`] if it is not a JSON object with
    ///   string-or-null fields.
    pub fn from_body(body: &[u8]) -> Result<Self, ServiceError> {
        if body.is_empty() {
            return Err(ServiceError::EmptyBody);
        }
        serde_json::from_slice(body).map_err(|e| ServiceError::MalformedBody(e.to_string()))
    }

    /// Checks that every field is present, not blank, and fits its column.
    ///
    /// Values are kept as sent; trimming is only used for the check.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MissingRequiredField`] naming the first
    /// offending field group, or [`ServiceError::FieldTooLong`] when
    /// `title` or `username` exceeds [`VARCHAR_WIDTH`] characters.
    pub fn validate(self) -> Result<NewPost, ServiceError> {
        if is_blank(self.title.as_ref()) || is_blank(self.content.as_ref()) {
            return Err(ServiceError::MissingRequiredField(
                "title and content should not be empty",
            ));
        }
        if is_blank(self.username.as_ref()) {
            return Err(ServiceError::MissingRequiredField(
                "username should not be empty",
            ));
        }
        if is_too_wide(self.title.as_ref()) {
            return Err(ServiceError::FieldTooLong("title"));
        }
        if is_too_wide(self.username.as_ref()) {
            return Err(ServiceError::FieldTooLong("username"));
        }
        Ok(NewPost {
            title: self.title.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
        })
    }
}

/// One row of the `GET /posts/{pid}` response array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PostDto {
    /// Post id.
    pub id: i32,
    /// Author of the post.
    pub username: String,
    /// Post title.
    pub title: String,
    /// Post body.
    pub content: String,
}

impl From<Post> for PostDto {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            username: post.username,
            title: post.title,
            content: post.content,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<NewPost, ServiceError> {
        CreatePostRequest::from_body(body.as_bytes())?.validate()
    }

    #[test]
    fn accepts_complete_body_and_keeps_values_verbatim() {
        let Ok(post) = parse(r#"{"title":" Hi ","content":"body","username":"alice"}"#) else {
            panic!("valid body rejected");
        };
        assert_eq!(post.title, " Hi ");
        assert_eq!(post.username, "alice");
    }

    #[test]
    fn empty_body_is_its_own_error() {
        assert!(matches!(parse(""), Err(ServiceError::EmptyBody)));
    }

    #[test]
    fn non_json_and_wrong_types_are_malformed() {
        assert!(matches!(parse("title=x"), Err(ServiceError::MalformedBody(_))));
        assert!(matches!(parse("[1,2]"), Err(ServiceError::MalformedBody(_))));
        assert!(matches!(
            parse(r#"{"title":1,"content":"c","username":"u"}"#),
            Err(ServiceError::MalformedBody(_))
        ));
    }

    #[test]
    fn blank_title_or_content_is_rejected_first() {
        for body in [
            r#"{"content":"c","username":"u"}"#,
            r#"{"title":"   ","content":"c","username":"u"}"#,
            r#"{"title":"t","content":null,"username":"u"}"#,
            r#"{}"#,
        ] {
            assert!(matches!(
                parse(body),
                Err(ServiceError::MissingRequiredField("title and content should not be empty"))
            ));
        }
    }

    #[test]
    fn blank_username_is_rejected() {
        for body in [
            r#"{"title":"t","content":"c"}"#,
            r#"{"title":"t","content":"c","username":"\t"}"#,
        ] {
            assert!(matches!(
                parse(body),
                Err(ServiceError::MissingRequiredField("username should not be empty"))
            ));
        }
    }

    #[test]
    fn varchar_fields_are_bounded_in_characters() {
        let at_limit = "é".repeat(VARCHAR_WIDTH);
        let body = format!(r#"{{"title":"{at_limit}","content":"c","username":"{at_limit}"}}"#);
        assert!(parse(&body).is_ok());

        let over = "x".repeat(VARCHAR_WIDTH + 1);
        let body = format!(r#"{{"title":"{over}","content":"c","username":"u"}}"#);
        assert!(matches!(parse(&body), Err(ServiceError::FieldTooLong("title"))));

        let body = format!(r#"{{"title":"t","content":"c","username":"{over}"}}"#);
        assert!(matches!(parse(&body), Err(ServiceError::FieldTooLong("username"))));
    }

    #[test]
    fn content_is_unbounded() {
        let long = "x".repeat(10 * VARCHAR_WIDTH);
        let body = format!(r#"{{"title":"t","content":"{long}","username":"u"}}"#);
        assert!(parse(&body).is_ok());
    }
}
