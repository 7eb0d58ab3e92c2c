use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::ScrapeError;
use crate::parser::Fields;

/// Normalized user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub full_name: String,
    pub avatar_url: String,
    pub city: String,
    pub country_code: String,
    pub followers_count: u64,
    pub followings_count: u64,
    pub track_count: u64,
    pub verified: bool,
    pub badges: BTreeSet<String>,
    pub permalink_url: String,
    pub uri: String,
}

/// Parse a raw user object. Requires `id` and a username (or permalink).
pub fn parse_user(raw: &Value) -> Result<UserRecord, ScrapeError> {
    let f = Fields::new("user", raw)?;

    let verified = f.flag("verified")?;
    let mut badges = parse_badges(f.object("badges"));
    if verified {
        badges.insert("verified".to_string());
    }

    Ok(UserRecord {
        id: f.id()?,
        username: f.required_text(&["username", "permalink"])?,
        full_name: f.text_any(&["full_name", "name"])?,
        avatar_url: f.text_any(&["avatar_url", "avatar_url_template"])?,
        city: f.text("city")?,
        country_code: f.text("country_code")?,
        followers_count: f.count("followers_count")?,
        followings_count: f.count("followings_count")?,
        track_count: f.count("track_count")?,
        verified: verified || badges.contains("verified"),
        badges,
        permalink_url: f.text("permalink_url")?,
        uri: f.text("uri")?,
    })
}

/// Names of the badges flagged `true`
fn parse_badges(badges: Option<&Value>) -> BTreeSet<String> {
    badges
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| v.as_bool() == Some(true))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_full_user() {
        let raw = json!({
            "kind": "user",
            "id": 3148453,
            "username": "DnB Allstars",
            "permalink": "dnballstars",
            "full_name": "",
            "followers_count": 612345,
            "followings_count": 120,
            "track_count": 987,
            "verified": false,
            "badges": {"pro": false, "pro_unlimited": true, "verified": true},
            "avatar_url": "https://i1.sndcdn.com/avatars-000-large.jpg",
            "city": "London",
            "country_code": "GB",
            "permalink_url": "https://soundcloud.com/dnballstars",
            "uri": "https://api.soundcloud.com/users/3148453"
        });

        let user = parse_user(&raw).unwrap();
        assert_eq!(user.id, 3148453);
        assert_eq!(user.username, "DnB Allstars");
        assert_eq!(user.followers_count, 612345);
        assert!(user.verified);
        assert_eq!(
            user.badges.iter().cloned().collect::<Vec<_>>(),
            vec!["pro_unlimited".to_string(), "verified".to_string()]
        );
        assert_eq!(user.country_code, "GB");
    }

    #[test]
    fn test_minimal_user_defaults() {
        let user = parse_user(&json!({"id": 1, "permalink": "someone"})).unwrap();
        assert_eq!(user.username, "someone");
        assert_eq!(user.followers_count, 0);
        assert!(!user.verified);
        assert!(user.badges.is_empty());
        assert_eq!(user.avatar_url, "");
    }

    #[test]
    fn test_user_requires_id_and_name() {
        let missing_id = parse_user(&json!({"username": "x"})).unwrap_err();
        assert_eq!(missing_id.kind(), ErrorKind::MalformedRecord);

        let missing_name = parse_user(&json!({"id": 1})).unwrap_err();
        assert_eq!(missing_name.kind(), ErrorKind::MalformedRecord);

        let bad_count = parse_user(&json!({"id": 1, "username": "x", "followers_count": "many"})).unwrap_err();
        assert_eq!(bad_count.kind(), ErrorKind::MalformedRecord);
    }
}
