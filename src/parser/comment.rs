use serde::Serialize;
use serde_json::Value;

use crate::error::ScrapeError;
use crate::parser::Fields;

/// Partial author of a comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentUser {
    pub id: u64,
    pub username: String,
    pub avatar_url: String,
}

/// A timed comment on a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub id: u64,
    pub body: String,
    /// Offset into the track in milliseconds
    pub timestamp_ms: u64,
    pub created_at: String,
    pub user: CommentUser,
}

/// Parse a raw comment object. Requires the comment `id` and the author's username.
pub fn parse_comment(raw: &Value) -> Result<CommentRecord, ScrapeError> {
    let f = Fields::new("comment", raw)?;

    let user_raw = f
        .object("user")
        .ok_or_else(|| ScrapeError::malformed("comment", "missing required field `user`"))?;
    let u = Fields::new("comment", user_raw)?;

    Ok(CommentRecord {
        id: f.id()?,
        body: f.text_any(&["body", "comment"])?,
        timestamp_ms: f.count("timestamp")?,
        created_at: f.text("created_at")?,
        user: CommentUser {
            id: u.count("id")?,
            username: u.required_text(&["username", "permalink", "name"])?,
            avatar_url: u.text("avatar_url")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_comment() {
        let raw = json!({
            "kind": "comment",
            "id": 2001,
            "body": "that drop at 1:02",
            "timestamp": 62000,
            "created_at": "2023-01-20T10:00:00Z",
            "user": {"id": 9, "username": "raver", "avatar_url": "https://a/9.jpg", "followers_count": 4}
        });

        let comment = parse_comment(&raw).unwrap();
        assert_eq!(comment.timestamp_ms, 62000);
        assert_eq!(comment.user.username, "raver");
        assert_eq!(comment.user.id, 9);
    }

    #[test]
    fn test_null_timestamp_defaults_to_zero() {
        let comment = parse_comment(&json!({"id": 1, "body": "hi", "timestamp": null, "user": {"permalink": "p"}})).unwrap();
        assert_eq!(comment.timestamp_ms, 0);
        assert_eq!(comment.user.username, "p");
        assert_eq!(comment.created_at, "");
    }

    #[test]
    fn test_comment_without_author_is_malformed() {
        assert!(parse_comment(&json!({"id": 1, "body": "hi"})).is_err());
        assert!(parse_comment(&json!({"body": "hi", "user": {"username": "x"}})).is_err());
        assert!(parse_comment(&json!({"id": 1, "timestamp": "soon", "user": {"username": "x"}})).is_err());
    }
}
