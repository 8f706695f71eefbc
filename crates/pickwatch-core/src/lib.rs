//! Core domain model and record normalization for the champion pick sync.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CRATE_NAME: &str = "pickwatch-core";

/// One raw result row from the wiki's Cargo query, as it appears inside the
/// response's `title` object. Every field is optional on the wire; required
/// fields are enforced by [`normalize`].
///
/// The timestamp key really does contain a space: the Cargo API rewrites the
/// underscore in `DateTime_UTC` when it serializes field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawMatch {
    #[serde(rename = "GameId")]
    pub game_id: Option<String>,
    #[serde(rename = "Link")]
    pub player: Option<String>,
    #[serde(rename = "Tournament")]
    pub tournament: Option<String>,
    #[serde(rename = "DateTime UTC")]
    pub datetime_utc: Option<String>,
    #[serde(rename = "PlayerWin")]
    pub player_win: Option<String>,
    #[serde(rename = "VOD")]
    pub vod: Option<String>,
}

/// Validated pick ready for the per-champion tables. The `notified` column is
/// deliberately absent here: the writer recomputes it on every upsert from
/// the stored row, never from pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPick {
    /// SHA-256 hex digest of the wiki's game identifier.
    pub game_id: String,
    pub player: String,
    pub tournament: String,
    pub won: bool,
    pub timestamp: DateTime<Utc>,
    pub vod: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalize one raw row or reject it whole. A missing required field or an
/// unparseable timestamp rejects the record; no partially-normalized output
/// ever escapes.
pub fn normalize(raw: &RawMatch) -> Result<NormalizedPick, NormalizeError> {
    let game_id = raw
        .game_id
        .as_deref()
        .ok_or(NormalizeError::MissingField("GameId"))?;
    let player = raw
        .player
        .as_deref()
        .ok_or(NormalizeError::MissingField("Link"))?;
    let tournament = raw
        .tournament
        .as_deref()
        .ok_or(NormalizeError::MissingField("Tournament"))?;
    let datetime_utc = raw
        .datetime_utc
        .as_deref()
        .ok_or(NormalizeError::MissingField("DateTime UTC"))?;
    let player_win = raw
        .player_win
        .as_deref()
        .ok_or(NormalizeError::MissingField("PlayerWin"))?;

    Ok(NormalizedPick {
        game_id: sha256_hex(game_id.as_bytes()),
        player: player.to_owned(),
        tournament: tournament.to_owned(),
        // Two-valued categorical mapping, not a boolean parse: anything other
        // than the exact literal "Yes" is a loss.
        won: player_win == "Yes",
        timestamp: parse_match_timestamp(datetime_utc)?,
        vod: raw.vod.as_deref().map(unescape_vod),
    })
}

/// The wiki emits `%Y-%m-%d %H:%M:%S` naive timestamps that are UTC by
/// convention; RFC 3339 is accepted as well so fixtures can use the stricter
/// form.
fn parse_match_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| NormalizeError::BadTimestamp(raw.to_owned()))
}

/// Undo the one escape the wiki is known to emit in VOD links. This is a
/// literal single-pass replacement, not a general entity decoder.
fn unescape_vod(vod: &str) -> String {
    vod.replace("&amp;", "&")
}
