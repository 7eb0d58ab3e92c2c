use tracing::debug;
use url::Url;

use crate::error::ScrapeError;
use crate::scraper::task::{ResourceKind, ScrapeRequest, SearchScope};

const WEB_ORIGIN: &str = "https://soundcloud.com";

/// Hosts serving the regular web permalinks
const PERMALINK_HOSTS: &[&str] = &["soundcloud.com", "www.soundcloud.com", "m.soundcloud.com"];

/// Hosts serving short links that redirect to a permalink
const SHORT_LINK_HOSTS: &[&str] = &["on.soundcloud.com", "snd.sc"];

/// Top-level paths that belong to the site rather than to a user
const RESERVED_ROOTS: &[&str] = &[
    "charts", "discover", "feed", "imprint", "jobs", "logout", "messages", "mobile",
    "notifications", "pages", "pro", "settings", "signin", "stream", "terms-of-use",
    "upload", "you",
];

/// Second path segments that are tabs of a user profile
const PROFILE_TABS: &[&str] = &[
    "albums", "comments", "followers", "following", "likes", "popular-tracks",
    "reposts", "sets", "spotlight", "tracks",
];

/// Classify an input URL or search URL into a scrape request.
///
/// Pure: short links are reported as unsupported here and must be expanded
/// by the caller first (see [`short_link`]).
pub fn classify(input: &str) -> Result<ScrapeRequest, ScrapeError> {
    let unsupported = || ScrapeError::UnsupportedUrlKind(input.to_string());

    let url = Url::parse(input.trim()).map_err(|_| unsupported())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(unsupported());
    }

    let host = url.host_str().map(str::to_lowercase).ok_or_else(unsupported)?;
    if !PERMALINK_HOSTS.contains(&host.as_str()) {
        return Err(unsupported());
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let query = url.query_pairs().find(|(k, _)| k == "q").map(|(_, v)| v.trim().to_string());

    if segments.first() == Some(&"search") || query.is_some() {
        let term = query.filter(|q| !q.is_empty()).ok_or_else(unsupported)?;
        let scope = match segments.get(1).copied() {
            Some("sounds") => SearchScope::Tracks,
            Some("people") => SearchScope::Users,
            Some("sets") => SearchScope::Playlists,
            Some("albums") => SearchScope::Albums,
            _ => SearchScope::All,
        };
        debug!("Classified {} as search ({:?}) for {:?}", input, scope, term);
        return Ok(ScrapeRequest {
            raw_url: input.to_string(),
            resolved_kind: ResourceKind::Search,
            resource_id: term,
            canonical_url: url.to_string(),
            search_scope: Some(scope),
        });
    }

    if segments.is_empty() || !segments.iter().all(|s| is_slug(s)) {
        return Err(unsupported());
    }
    if RESERVED_ROOTS.contains(&segments[0].to_lowercase().as_str()) {
        return Err(unsupported());
    }

    let kind = match segments.as_slice() {
        [_user] => ResourceKind::User,
        [_user, tab] if PROFILE_TABS.contains(tab) => ResourceKind::User,
        [_user, _track] => ResourceKind::Track,
        [_user, "sets", _slug] => ResourceKind::Playlist,
        [_user, "albums", _slug] => ResourceKind::Album,
        [_user, track, token] if !PROFILE_TABS.contains(track) && is_secret_token(token) => {
            ResourceKind::Track
        }
        [_user, "sets", _slug, token] if is_secret_token(token) => ResourceKind::Playlist,
        _ => return Err(unsupported()),
    };

    // Profile tabs resolve to the profile itself
    let path_len = if kind == ResourceKind::User { 1 } else { segments.len() };
    let path = segments[..path_len].join("/");

    debug!("Classified {} as {} ({})", input, kind, path);

    Ok(ScrapeRequest {
        raw_url: input.to_string(),
        resolved_kind: kind,
        resource_id: path.to_lowercase(),
        canonical_url: format!("{}/{}", WEB_ORIGIN, path),
        search_scope: None,
    })
}

/// Returns the parsed URL when the input is a platform short link
pub fn short_link(input: &str) -> Option<Url> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    SHORT_LINK_HOSTS.contains(&host.as_str()).then_some(url)
}

fn is_slug(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_secret_token(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with("s-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kind_of(url: &str) -> ResourceKind {
        classify(url).unwrap().resolved_kind
    }

    #[test]
    fn test_recognized_kinds() {
        assert_eq!(kind_of("https://soundcloud.com/dnballstars/hedex-dnb-allstars-360"), ResourceKind::Track);
        assert_eq!(kind_of("https://soundcloud.com/dnballstars/sets/best-of-2023"), ResourceKind::Playlist);
        assert_eq!(kind_of("https://soundcloud.com/dnballstars/albums/allstars-lp"), ResourceKind::Album);
        assert_eq!(kind_of("https://soundcloud.com/dnballstars"), ResourceKind::User);
        assert_eq!(kind_of("https://soundcloud.com/dnballstars/tracks"), ResourceKind::User);
        assert_eq!(kind_of("https://soundcloud.com/search?q=hedex"), ResourceKind::Search);
        assert_eq!(kind_of("https://soundcloud.com/search/sounds?q=hedex"), ResourceKind::Search);
        assert_eq!(kind_of("https://soundcloud.com/artist/track/s-AbCdEf"), ResourceKind::Track);
        assert_eq!(kind_of("https://soundcloud.com/artist/sets/mix/s-AbCdEf"), ResourceKind::Playlist);
    }

    #[test]
    fn test_normalization() {
        let req = classify("https://m.soundcloud.com/DnBAllstars/Hedex-DnB-Allstars-360/?si=abc&utm_source=x").unwrap();
        assert_eq!(req.resource_id, "dnballstars/hedex-dnb-allstars-360");
        assert_eq!(req.canonical_url, "https://soundcloud.com/DnBAllstars/Hedex-DnB-Allstars-360");
        assert_eq!(req.raw_url, "https://m.soundcloud.com/DnBAllstars/Hedex-DnB-Allstars-360/?si=abc&utm_source=x");

        let tab = classify("https://soundcloud.com/dnballstars/likes").unwrap();
        assert_eq!(tab.resource_id, "dnballstars");
        assert_eq!(tab.canonical_url, "https://soundcloud.com/dnballstars");
    }

    #[test]
    fn test_search_scope_and_term() {
        let req = classify("https://soundcloud.com/search/people?q=drum%20and%20bass").unwrap();
        assert_eq!(req.search_scope, Some(SearchScope::Users));
        assert_eq!(req.resource_id, "drum and bass");

        let all = classify("https://soundcloud.com/search?q=hedex").unwrap();
        assert_eq!(all.search_scope, Some(SearchScope::All));
    }

    #[test]
    fn test_unsupported_inputs() {
        for input in [
            "",
            "not a url",
            "ftp://soundcloud.com/a/b",
            "https://example.com/a/b",
            "https://soundcloud.com/",
            "https://soundcloud.com/search",
            "https://soundcloud.com/search?q=",
            "https://soundcloud.com/discover",
            "https://soundcloud.com/a/b/c/d/e",
            "https://soundcloud.com/a/track/notatoken",
            "https://on.soundcloud.com/AbCd1",
        ] {
            let err = classify(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedUrlKind, "input {:?}", input);
        }
    }

    #[test]
    fn test_short_link_detection() {
        assert!(short_link("https://on.soundcloud.com/AbCd1").is_some());
        assert!(short_link("http://snd.sc/xyz").is_some());
        assert!(short_link("https://soundcloud.com/a/b").is_none());
        assert!(short_link("garbage").is_none());
    }
}
