//! Cargo query client for the League of Legends esports wiki.

use anyhow::Context;
use async_trait::async_trait;
use pickwatch_core::RawMatch;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "pickwatch-wiki";

/// MediaWiki endpoint the pick queries go to.
pub const API_URL: &str = "https://lol.fandom.com/api.php";

const USER_AGENT: &str = concat!("pickwatch/", env!("CARGO_PKG_VERSION"));

/// Fixed shape of the pick query. Only the champion filter varies per call;
/// everything else is pinned so each run asks for exactly the same window:
/// the 500 most recent games for one champion, newest first.
pub const QUERY_TABLES: &str = "ScoreboardPlayers,ScoreboardGames";
pub const QUERY_FIELDS: &str = "ScoreboardPlayers.GameId,ScoreboardPlayers.Link,ScoreboardGames.Tournament,ScoreboardPlayers.DateTime_UTC,ScoreboardPlayers.PlayerWin,ScoreboardGames.VOD";
pub const QUERY_JOIN_ON: &str = "ScoreboardPlayers.GameId=ScoreboardGames.GameId";
pub const QUERY_ORDER_BY: &str = "ScoreboardPlayers.DateTime_UTC DESC";
pub const QUERY_LIMIT: u32 = 500;

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("cargo query request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cargo query returned http {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("cargo api error {code}: {info}")]
    Api { code: String, info: String },
    #[error("decoding cargo response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetch capability the pipeline consumes; kept narrow so runs can be driven
/// from canned data in tests.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_picks(&self, champion: &str) -> Result<Vec<RawMatch>, WikiError>;
}

/// Assemble the full Cargo query parameter set for one champion. Single
/// quotes in the champion name are doubled, SQL-literal style, so names like
/// `Kai'Sa` survive the `where` clause.
pub fn cargo_params(champion: &str) -> Vec<(&'static str, String)> {
    let escaped = champion.replace('\'', "''");
    vec![
        ("action", "cargoquery".to_owned()),
        ("format", "json".to_owned()),
        ("tables", QUERY_TABLES.to_owned()),
        ("fields", QUERY_FIELDS.to_owned()),
        ("join_on", QUERY_JOIN_ON.to_owned()),
        (
            "where",
            format!("ScoreboardPlayers.Champion = '{escaped}'"),
        ),
        ("order_by", QUERY_ORDER_BY.to_owned()),
        ("limit", QUERY_LIMIT.to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct CargoResponse {
    cargoquery: Option<Vec<CargoRow>>,
    error: Option<CargoApiError>,
}

#[derive(Debug, Deserialize)]
struct CargoRow {
    title: RawMatch,
}

#[derive(Debug, Deserialize)]
struct CargoApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

/// Decode a Cargo response body into raw rows. A MediaWiki `error` envelope
/// becomes [`WikiError::Api`]; a missing or empty `cargoquery` array is an
/// empty result, not an error.
pub fn parse_cargo_response(body: &str) -> Result<Vec<RawMatch>, WikiError> {
    let response: CargoResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(WikiError::Api {
            code: error.code,
            info: error.info,
        });
    }
    Ok(response
        .cargoquery
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.title)
        .collect())
}

/// HTTP client for the wiki. Timeouts stay on the client defaults; the
/// surrounding run has no retry layer, so a slow query is simply a failed
/// run.
#[derive(Debug, Clone)]
pub struct WikiClient {
    client: reqwest::Client,
}

impl WikiClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()
            .context("building wiki http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MatchSource for WikiClient {
    async fn fetch_picks(&self, champion: &str) -> Result<Vec<RawMatch>, WikiError> {
        let response = self
            .client
            .get(API_URL)
            .query(&cargo_params(champion))
            .send()
            .await?;
        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            return Err(WikiError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().await?;
        let rows = parse_cargo_response(&body)?;
        debug!(champion, rows = rows.len(), "cargo query returned");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> &'a str {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing query param {key}"))
    }

    #[test]
    fn cargo_params_pin_the_query_shape() {
        let params = cargo_params("Jhin");
        assert_eq!(param(&params, "action"), "cargoquery");
        assert_eq!(param(&params, "format"), "json");
        assert_eq!(param(&params, "tables"), "ScoreboardPlayers,ScoreboardGames");
        assert_eq!(
            param(&params, "join_on"),
            "ScoreboardPlayers.GameId=ScoreboardGames.GameId"
        );
        assert_eq!(
            param(&params, "where"),
            "ScoreboardPlayers.Champion = 'Jhin'"
        );
        assert_eq!(
            param(&params, "order_by"),
            "ScoreboardPlayers.DateTime_UTC DESC"
        );
        assert_eq!(param(&params, "limit"), "500");
        assert!(param(&params, "fields").contains("ScoreboardGames.VOD"));
        assert_eq!(params.len(), 8);
    }

    #[test]
    fn champion_quotes_are_doubled_in_the_filter() {
        let params = cargo_params("Kai'Sa");
        assert_eq!(
            param(&params, "where"),
            "ScoreboardPlayers.Champion = 'Kai''Sa'"
        );
    }

    #[test]
    fn response_rows_decode_from_the_title_envelope() {
        let body = r#"{
            "cargoquery": [
                {
                    "title": {
                        "GameId": "ESPORTSTMNT01_1234567",
                        "Link": "Ruler",
                        "Tournament": "Worlds 2023",
                        "DateTime UTC": "2023-10-29 08:12:00",
                        "DateTime UTC__precision": "0",
                        "PlayerWin": "Yes",
                        "VOD": "https://v.example/w?t=10&amp;h=1"
                    }
                },
                {
                    "title": {
                        "GameId": "ESPORTSTMNT01_1234568",
                        "Link": "Gumayusi",
                        "PlayerWin": "No",
                        "VOD": null
                    }
                }
            ],
            "limits": { "cargoquery": 500 }
        }"#;
        let rows = parse_cargo_response(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].game_id.as_deref(), Some("ESPORTSTMNT01_1234567"));
        assert_eq!(rows[0].datetime_utc.as_deref(), Some("2023-10-29 08:12:00"));
        assert_eq!(rows[1].tournament, None);
        assert_eq!(rows[1].vod, None);
    }

    #[test]
    fn api_error_envelope_becomes_a_typed_error() {
        let body = r#"{
            "error": {
                "code": "internal_api_error_MWException",
                "info": "Something went wrong",
                "*": "ignored detail"
            }
        }"#;
        match parse_cargo_response(body) {
            Err(WikiError::Api { code, info }) => {
                assert_eq!(code, "internal_api_error_MWException");
                assert_eq!(info, "Something went wrong");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn empty_and_missing_result_arrays_are_empty_not_errors() {
        assert_eq!(parse_cargo_response(r#"{"cargoquery": []}"#).unwrap(), vec![]);
        assert_eq!(parse_cargo_response(r#"{}"#).unwrap(), vec![]);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(
            parse_cargo_response("<html>502 Bad Gateway</html>"),
            Err(WikiError::Decode(_))
        ));
    }
}
