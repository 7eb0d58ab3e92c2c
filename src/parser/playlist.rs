use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ScrapeError;
use crate::parser::user::{parse_user, UserRecord};
use crate::parser::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistKind {
    Playlist,
    Album,
}

/// Compact track entry of a playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub id: u64,
    pub title: String,
    pub duration: u64,
    pub permalink_url: String,
    pub playback_count: u64,
    pub likes_count: u64,
    pub reposts_count: u64,
}

impl TrackSummary {
    /// Playlists only embed the first few tracks in full; the rest are id stubs
    pub fn is_stub(&self) -> bool {
        self.title.is_empty()
    }
}

/// Normalized playlist or album
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistRecord {
    pub id: u64,
    pub kind: PlaylistKind,
    pub title: String,
    pub description: String,
    pub genre: String,
    pub track_count: u64,
    pub duration: u64,
    pub permalink_url: String,
    pub release_date: String,
    pub created_at: String,
    pub user: UserRecord,
    pub tracks: Vec<TrackSummary>,
}

impl PlaylistRecord {
    pub fn stub_ids(&self) -> Vec<u64> {
        self.tracks.iter().filter(|t| t.is_stub()).map(|t| t.id).collect()
    }

    /// Replace stubs with the hydrated summaries that were found
    pub fn hydrate(&mut self, full: &[TrackSummary]) {
        for track in self.tracks.iter_mut().filter(|t| t.is_stub()) {
            if let Some(found) = full.iter().find(|f| f.id == track.id) {
                *track = found.clone();
            }
        }
    }
}

/// Parse a raw playlist or album object. Requires `id` and `title`.
///
/// Track entries without an id are dropped with a warning rather than failing
/// the playlist.
pub fn parse_playlist(raw: &Value) -> Result<PlaylistRecord, ScrapeError> {
    let f = Fields::new("playlist", raw)?;
    let id = f.id()?;

    let user = match f.object("user") {
        Some(user) => parse_user(user)
            .map_err(|e| ScrapeError::malformed("playlist", format!("embedded user: {}", e)))?,
        None => UserRecord::default(),
    };

    let mut tracks = Vec::new();
    for entry in f.array("tracks") {
        match parse_track_summary(entry) {
            Ok(track) => tracks.push(track),
            Err(e) => warn!("Dropping track entry of playlist {}: {}", id, e),
        }
    }

    let is_album = f.flag("is_album")?
        || f.text("set_type")? == "album"
        || raw.get("kind").and_then(Value::as_str) == Some("album");

    let track_count = match f.count("track_count")? {
        0 => tracks.len() as u64,
        n => n,
    };

    Ok(PlaylistRecord {
        id,
        kind: if is_album { PlaylistKind::Album } else { PlaylistKind::Playlist },
        title: f.required_text(&["title"])?,
        description: f.text("description")?,
        genre: f.text("genre")?,
        track_count,
        duration: f.count("duration")?,
        permalink_url: f.text("permalink_url")?,
        release_date: f.text("release_date")?,
        created_at: f.text("created_at")?,
        user,
        tracks,
    })
}

/// Parse a track entry (full or stub) into a summary. Only `id` is required.
pub fn parse_track_summary(raw: &Value) -> Result<TrackSummary, ScrapeError> {
    let f = Fields::new("track", raw)?;
    let likes_count = match f.opt_count("likes_count")? {
        Some(likes) => likes,
        None => f.count("favoritings_count")?,
    };

    Ok(TrackSummary {
        id: f.id()?,
        title: f.text("title")?,
        duration: f.count("duration")?,
        permalink_url: f.text("permalink_url")?,
        playback_count: f.count("playback_count")?,
        likes_count,
        reposts_count: f.count("reposts_count")?,
    })
}
