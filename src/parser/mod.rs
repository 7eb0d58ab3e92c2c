//! Entity parsers.
//!
//! Every parser is a pure function from a raw API object to a normalized
//! record. Required fields (the numeric `id` and the display name) must be
//! present; optional fields fall back to an empty string, `0`, `false` or an
//! empty collection. Numeric fields never accept non-integer JSON values.

pub mod comment;
pub mod playlist;
pub mod track;
pub mod user;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ScrapeError;
use crate::scraper::task::ResourceKind;

// Re-export common types
pub use comment::{parse_comment, CommentRecord};
pub use playlist::{parse_playlist, parse_track_summary, PlaylistRecord};
pub use track::{parse_track, TrackRecord};
pub use user::{parse_user, UserRecord};

/// A raw API object tagged with the parser that understands it
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Track(Value),
    User(Value),
    Playlist(Value),
    Comment(Value),
}

impl RawItem {
    /// Tag a raw object by its `kind` field, falling back to the kind the
    /// request was classified as when the object carries none.
    pub fn tag(value: Value, fallback: Option<ResourceKind>) -> Result<Self, ScrapeError> {
        let declared = value.get("kind").and_then(Value::as_str).map(str::to_string);
        match declared.as_deref() {
            Some("track") => Ok(Self::Track(value)),
            Some("user") => Ok(Self::User(value)),
            Some("playlist") | Some("album") | Some("system-playlist") => Ok(Self::Playlist(value)),
            Some("comment") => Ok(Self::Comment(value)),
            Some(other) => Err(ScrapeError::malformed("item", format!("unknown kind {:?}", other))),
            None => match fallback {
                Some(ResourceKind::Track) => Ok(Self::Track(value)),
                Some(ResourceKind::User) => Ok(Self::User(value)),
                Some(ResourceKind::Playlist) | Some(ResourceKind::Album) => Ok(Self::Playlist(value)),
                _ => Err(ScrapeError::malformed("item", "object has no kind")),
            },
        }
    }
}

/// A normalized top-level output record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Track(TrackRecord),
    User(UserRecord),
    Playlist(PlaylistRecord),
}

/// Record kinds that share the output stream; ids are unique across all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Track,
    User,
    Playlist,
}

impl Record {
    pub fn id(&self) -> u64 {
        match self {
            Self::Track(t) => t.id,
            Self::User(u) => u.id,
            Self::Playlist(p) => p.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Track(_) => RecordKind::Track,
            Self::User(_) => RecordKind::User,
            Self::Playlist(_) => RecordKind::Playlist,
        }
    }
}

/// Parse a tagged top-level item into its record
pub fn parse_item(item: &RawItem) -> Result<Record, ScrapeError> {
    match item {
        RawItem::Track(raw) => parse_track(raw).map(Record::Track),
        RawItem::User(raw) => parse_user(raw).map(Record::User),
        RawItem::Playlist(raw) => parse_playlist(raw).map(Record::Playlist),
        RawItem::Comment(_) => Err(ScrapeError::malformed("comment", "comments are only emitted inside tracks")),
    }
}

/// Typed, strict access to the fields of one raw object
pub(crate) struct Fields<'a> {
    kind: &'static str,
    obj: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(kind: &'static str, raw: &'a Value) -> Result<Self, ScrapeError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ScrapeError::malformed(kind, "expected a JSON object"))?;
        Ok(Self { kind, obj })
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn malformed(&self, reason: String) -> ScrapeError {
        ScrapeError::malformed(self.kind, reason)
    }

    /// Required non-negative integer id
    pub fn id(&self) -> Result<u64, ScrapeError> {
        self.opt_count("id")?
            .ok_or_else(|| self.malformed("missing required field `id`".to_string()))
    }

    /// Optional counter; `None` when absent or null
    pub fn opt_count(&self, key: &str) -> Result<Option<u64>, ScrapeError> {
        match self.present(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.malformed(format!("`{}` is not a non-negative integer: {}", key, value))),
        }
    }

    /// Optional counter defaulting to 0
    pub fn count(&self, key: &str) -> Result<u64, ScrapeError> {
        Ok(self.opt_count(key)?.unwrap_or(0))
    }

    /// Optional text; `None` when absent, null or empty
    pub fn opt_text(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.malformed(format!("`{}` is not a string: {}", key, other))),
        }
    }

    /// Optional text defaulting to the empty string
    pub fn text(&self, key: &str) -> Result<String, ScrapeError> {
        Ok(self.opt_text(key)?.unwrap_or_default())
    }

    /// First non-empty text among `keys`
    pub fn text_any(&self, keys: &[&str]) -> Result<String, ScrapeError> {
        for key in keys {
            if let Some(text) = self.opt_text(key)? {
                return Ok(text);
            }
        }
        Ok(String::new())
    }

    /// Required non-empty text, looked up through `keys` in order
    pub fn required_text(&self, keys: &[&str]) -> Result<String, ScrapeError> {
        let text = self.text_any(keys)?;
        if text.is_empty() {
            return Err(self.malformed(format!("missing required field `{}`", keys[0])));
        }
        Ok(text)
    }

    /// Optional flag defaulting to false
    pub fn flag(&self, key: &str) -> Result<bool, ScrapeError> {
        match self.present(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.malformed(format!("`{}` is not a boolean: {}", key, other))),
        }
    }

    pub fn object(&self, key: &str) -> Option<&'a Value> {
        self.present(key).filter(|v| v.is_object())
    }

    pub fn array(&self, key: &str) -> &'a [Value] {
        self.present(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_tag_by_kind_and_fallback() {
        assert!(matches!(RawItem::tag(json!({"kind": "track"}), None), Ok(RawItem::Track(_))));
        assert!(matches!(RawItem::tag(json!({"kind": "playlist"}), None), Ok(RawItem::Playlist(_))));
        assert!(matches!(
            RawItem::tag(json!({"id": 1}), Some(ResourceKind::Album)),
            Ok(RawItem::Playlist(_))
        ));
        assert!(RawItem::tag(json!({"kind": "station"}), None).is_err());
        assert!(RawItem::tag(json!({"id": 1}), Some(ResourceKind::Search)).is_err());
    }

    #[test]
    fn test_fields_are_strict_about_numbers() {
        let raw = json!({"id": 5, "plays": "12", "likes": -1, "reposts": null, "score": 1.5});
        let fields = Fields::new("track", &raw).unwrap();

        assert_eq!(fields.id().unwrap(), 5);
        assert_eq!(fields.count("reposts").unwrap(), 0);
        assert_eq!(fields.count("missing").unwrap(), 0);
        for key in ["plays", "likes", "score"] {
            assert_eq!(fields.count(key).unwrap_err().kind(), ErrorKind::MalformedRecord, "{}", key);
        }
    }

    #[test]
    fn test_fields_text_defaults() {
        let raw = json!({"title": "", "username": null, "permalink": "dnb", "genre": 5});
        let fields = Fields::new("user", &raw).unwrap();

        assert_eq!(fields.text("title").unwrap(), "");
        assert_eq!(fields.text_any(&["username", "permalink"]).unwrap(), "dnb");
        assert!(fields.required_text(&["title"]).is_err());
        assert!(fields.text("genre").is_err());
        assert!(!fields.flag("verified").unwrap());
        assert!(fields.array("tracks").is_empty());
    }

    #[test]
    fn test_parse_item_rejects_top_level_comments() {
        let item = RawItem::Comment(json!({"id": 1, "body": "x"}));
        assert_eq!(parse_item(&item).unwrap_err().kind(), ErrorKind::MalformedRecord);
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(Fields::new("track", &json!([1, 2])).is_err());
    }
}
