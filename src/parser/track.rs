use serde::Serialize;
use serde_json::Value;

use crate::error::ScrapeError;
use crate::parser::comment::CommentRecord;
use crate::parser::user::{parse_user, UserRecord};
use crate::parser::Fields;

/// One streamable rendition of a track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcoding {
    pub protocol: String,
    /// MIME type of the rendition
    pub format: String,
    pub url: String,
    pub preset: String,
    pub quality: String,
    pub snipped: bool,
}

/// Where the audio of a track can be fetched from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub streamable: bool,
    pub download_url: Option<String>,
    pub transcodings: Vec<Transcoding>,
}

/// Normalized track, optionally with its comment thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub artwork_url: String,
    pub caption: String,
    pub comment_count: u64,
    pub created_at: String,
    pub description: String,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub genre: String,
    pub id: u64,
    pub label_name: String,
    pub license: String,
    pub likes_count: u64,
    pub permalink_url: String,
    pub playback_count: u64,
    pub purchase_url: String,
    pub release_date: String,
    pub reposts_count: u64,
    pub tag_list: String,
    pub title: String,
    pub uri: String,
    pub user: UserRecord,
    pub comments: Vec<CommentRecord>,
    pub media: MediaInfo,
}

impl TrackRecord {
    /// Attach a comment thread, ordered by position in the track.
    ///
    /// The sort is stable, so comments at the same offset keep API order.
    pub fn attach_comments(&mut self, mut comments: Vec<CommentRecord>) {
        comments.sort_by_key(|c| c.timestamp_ms);
        if self.comment_count == 0 {
            self.comment_count = comments.len() as u64;
        }
        self.comments = comments;
    }
}

/// Parse a raw track object. Requires `id` and `title`.
pub fn parse_track(raw: &Value) -> Result<TrackRecord, ScrapeError> {
    let f = Fields::new("track", raw)?;

    let user = match f.object("user") {
        Some(user) => parse_user(user)
            .map_err(|e| ScrapeError::malformed("track", format!("embedded user: {}", e)))?,
        None => UserRecord::default(),
    };

    let likes_count = match f.opt_count("likes_count")? {
        Some(likes) => likes,
        None => f.count("favoritings_count")?,
    };

    Ok(TrackRecord {
        artwork_url: f.text_any(&["artwork_url", "artwork_url_template"])?,
        caption: f.text("caption")?,
        comment_count: f.count("comment_count")?,
        created_at: f.text("created_at")?,
        description: f.text("description")?,
        duration_ms: f.count("duration")?,
        genre: f.text("genre")?,
        id: f.id()?,
        label_name: f.text("label_name")?,
        license: f.text("license")?,
        likes_count,
        permalink_url: f.text("permalink_url")?,
        playback_count: f.count("playback_count")?,
        purchase_url: f.text("purchase_url")?,
        release_date: f.text("release_date")?,
        reposts_count: f.count("reposts_count")?,
        tag_list: f.text("tag_list")?,
        title: f.required_text(&["title"])?,
        uri: f.text("uri")?,
        user,
        comments: Vec::new(),
        media: parse_media(&f)?,
    })
}

fn parse_media(track: &Fields<'_>) -> Result<MediaInfo, ScrapeError> {
    let download_url = if track.flag("downloadable")? {
        track.opt_text("download_url")?
    } else {
        None
    };

    let transcodings = match track.object("media") {
        Some(media) => Fields::new("track", media)?
            .array("transcodings")
            .iter()
            .map(parse_transcoding)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(MediaInfo {
        streamable: track.flag("streamable")?,
        download_url,
        transcodings,
    })
}

fn parse_transcoding(raw: &Value) -> Result<Transcoding, ScrapeError> {
    let t = Fields::new("track", raw)?;
    let (protocol, format) = match t.object("format") {
        Some(format) => {
            let fmt = Fields::new("track", format)?;
            (fmt.text("protocol")?, fmt.text("mime_type")?)
        }
        None => (String::new(), String::new()),
    };

    Ok(Transcoding {
        protocol,
        format,
        url: t.text("url")?,
        preset: t.text("preset")?,
        quality: t.text("quality")?,
        snipped: t.flag("snipped")?,
    })
}
