//! REST client for the hosted Postgres instance. All persistence goes
//! through PostgREST conventions: `table?column=eq.value` filters, a
//! service-role bearer key, and `Prefer: return=representation` so inserts
//! hand back the stored row.

use std::fmt;

use chrono::{DateTime, Utc};
use common::{
    sanitize_json, ArtistProfileRecord, ClassificationRecord, DuplicateGroupRecord,
    LabelProfileRecord, PatternKind, PatternRecord, ScanSessionRecord, ScanStatus, TrackRecord,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TRACKS_TABLE: &str = "cultural_tracks";
pub const CLASSIFICATIONS_TABLE: &str = "cultural_classifications";
pub const PATTERNS_TABLE: &str = "cultural_patterns";
pub const ARTIST_PROFILES_TABLE: &str = "cultural_artist_profiles";
pub const LABEL_PROFILES_TABLE: &str = "cultural_label_profiles";
pub const DUPLICATES_TABLE: &str = "cultural_duplicates";
pub const SCAN_SESSIONS_TABLE: &str = "cultural_scan_sessions";

#[derive(Clone, Debug, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

#[derive(Debug)]
pub enum DbError {
    Http(reqwest::Error),
    Json(serde_json::Error),
    Status { status: StatusCode, body: String },
    InvalidKey,
    MissingRow(&'static str),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Http(err) => write!(f, "http request failed: {}", err),
            DbError::Json(err) => write!(f, "invalid response payload: {}", err),
            DbError::Status { status, body } => {
                write!(f, "unexpected status {}: {}", status, body)
            }
            DbError::InvalidKey => write!(f, "service role key is not a valid header value"),
            DbError::MissingRow(table) => {
                write!(f, "{} write returned no representation", table)
            }
        }
    }
}

impl std::error::Error for DbError {}

impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        DbError::Http(err)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Json(err)
    }
}

#[derive(Deserialize)]
struct RowId {
    id: i64,
}

/// Partial update for a reinforced pattern. Only set fields are sent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatternUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinforcement_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanSessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_discovered: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_analyzed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_classified: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_found: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self, DbError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_role_key)
            .map_err(|_| DbError::InvalidKey)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_role_key))
            .map_err(|_| DbError::InvalidKey)?;
        headers.insert(HeaderName::from_static("apikey"), key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", config.url.trim_end_matches('/')),
        })
    }

    // -- tracks --

    pub async fn create_track(&self, track: &TrackRecord) -> Result<i64, DbError> {
        self.insert_id(TRACKS_TABLE, track).await
    }

    /// Rewrites a changed file's row in place so the track keeps its id and
    /// any classification pointing at it.
    pub async fn update_track(&self, id: i64, track: &TrackRecord) -> Result<(), DbError> {
        let mut body = serde_json::to_value(track)?;
        if let Value::Object(map) = &mut body {
            map.remove("id");
        }
        let path = format!("{}?id=eq.{}", TRACKS_TABLE, id);
        self.patch(&path, body).await
    }

    pub async fn track_by_path(&self, path: &str) -> Result<Option<TrackRecord>, DbError> {
        let query = format!(
            "{}?file_path={}&limit=1",
            TRACKS_TABLE,
            eq_filter(path)
        );
        Ok(self.get_rows(&query).await?.into_iter().next())
    }

    pub async fn all_tracks(&self) -> Result<Vec<TrackRecord>, DbError> {
        self.get_paged(TRACKS_TABLE, "order=id.asc").await
    }

    pub async fn mark_track_status(&self, track_id: i64, status: &str) -> Result<(), DbError> {
        let path = format!("{}?id=eq.{}", TRACKS_TABLE, track_id);
        self.patch(&path, serde_json::json!({ "processing_status": status }))
            .await
    }

    // -- classifications --

    /// One classification row per track. A rescan overwrites the previous
    /// machine classification but never clears `human_validated`.
    pub async fn upsert_classification(
        &self,
        record: &ClassificationRecord,
    ) -> Result<i64, DbError> {
        let query = format!(
            "{}?track_id=eq.{}&select=id&limit=1",
            CLASSIFICATIONS_TABLE, record.track_id
        );
        let existing: Vec<RowId> = self.get_rows(&query).await?;
        match existing.into_iter().next() {
            Some(row) => {
                let mut body = serde_json::to_value(record)?;
                if let Value::Object(map) = &mut body {
                    map.remove("id");
                    map.remove("human_validated");
                }
                let path = format!("{}?id=eq.{}", CLASSIFICATIONS_TABLE, row.id);
                self.patch(&path, body).await?;
                Ok(row.id)
            }
            None => self.insert_id(CLASSIFICATIONS_TABLE, record).await,
        }
    }

    pub async fn all_classifications(&self) -> Result<Vec<ClassificationRecord>, DbError> {
        self.get_paged(CLASSIFICATIONS_TABLE, "order=id.asc").await
    }

    // -- patterns --

    pub async fn all_patterns(&self) -> Result<Vec<PatternRecord>, DbError> {
        self.get_paged(PATTERNS_TABLE, "order=id.asc").await
    }

    pub async fn find_pattern(
        &self,
        kind: PatternKind,
        value: &str,
        genre: &str,
    ) -> Result<Option<PatternRecord>, DbError> {
        let query = format!(
            "{}?pattern_type=eq.{}&pattern_value={}&genre={}&limit=1",
            PATTERNS_TABLE,
            kind.as_str(),
            eq_filter(value),
            eq_filter(genre)
        );
        Ok(self.get_rows(&query).await?.into_iter().next())
    }

    pub async fn create_pattern(&self, pattern: &PatternRecord) -> Result<i64, DbError> {
        self.insert_id(PATTERNS_TABLE, pattern).await
    }

    pub async fn update_pattern(&self, id: i64, update: &PatternUpdate) -> Result<(), DbError> {
        let path = format!("{}?id=eq.{}", PATTERNS_TABLE, id);
        self.patch(&path, serde_json::to_value(update)?).await
    }

    // -- artist profiles --

    pub async fn all_artist_profiles(&self) -> Result<Vec<ArtistProfileRecord>, DbError> {
        self.get_paged(ARTIST_PROFILES_TABLE, "order=id.asc").await
    }

    pub async fn upsert_artist_profile(
        &self,
        profile: &ArtistProfileRecord,
    ) -> Result<i64, DbError> {
        let query = format!(
            "{}?normalized_name={}&select=id&limit=1",
            ARTIST_PROFILES_TABLE,
            eq_filter(&profile.normalized_name)
        );
        let existing: Vec<RowId> = self.get_rows(&query).await?;
        match existing.into_iter().next() {
            Some(row) => {
                let mut body = serde_json::to_value(profile)?;
                if let Value::Object(map) = &mut body {
                    map.remove("id");
                }
                let path = format!("{}?id=eq.{}", ARTIST_PROFILES_TABLE, row.id);
                self.patch(&path, body).await?;
                Ok(row.id)
            }
            None => self.insert_id(ARTIST_PROFILES_TABLE, profile).await,
        }
    }

    // -- label profiles --

    pub async fn all_label_profiles(&self) -> Result<Vec<LabelProfileRecord>, DbError> {
        self.get_paged(LABEL_PROFILES_TABLE, "order=id.asc").await
    }

    pub async fn upsert_label_profile(
        &self,
        profile: &LabelProfileRecord,
    ) -> Result<i64, DbError> {
        let query = format!(
            "{}?normalized_name={}&select=id&limit=1",
            LABEL_PROFILES_TABLE,
            eq_filter(&profile.normalized_name)
        );
        let existing: Vec<RowId> = self.get_rows(&query).await?;
        match existing.into_iter().next() {
            Some(row) => {
                let mut body = serde_json::to_value(profile)?;
                if let Value::Object(map) = &mut body {
                    map.remove("id");
                }
                let path = format!("{}?id=eq.{}", LABEL_PROFILES_TABLE, row.id);
                self.patch(&path, body).await?;
                Ok(row.id)
            }
            None => self.insert_id(LABEL_PROFILES_TABLE, profile).await,
        }
    }

    // -- duplicates --

    pub async fn upsert_duplicate_group(
        &self,
        group: &DuplicateGroupRecord,
    ) -> Result<i64, DbError> {
        let query = format!(
            "{}?file_hash={}&select=id&limit=1",
            DUPLICATES_TABLE,
            eq_filter(&group.file_hash)
        );
        let existing: Vec<RowId> = self.get_rows(&query).await?;
        match existing.into_iter().next() {
            Some(row) => {
                let mut body = serde_json::to_value(group)?;
                if let Value::Object(map) = &mut body {
                    map.remove("id");
                }
                let path = format!("{}?id=eq.{}", DUPLICATES_TABLE, row.id);
                self.patch(&path, body).await?;
                Ok(row.id)
            }
            None => self.insert_id(DUPLICATES_TABLE, group).await,
        }
    }

    // -- scan sessions --

    pub async fn create_scan_session(&self, session: &ScanSessionRecord) -> Result<i64, DbError> {
        self.insert_id(SCAN_SESSIONS_TABLE, session).await
    }

    pub async fn update_scan_session(
        &self,
        id: i64,
        update: &ScanSessionUpdate,
    ) -> Result<(), DbError> {
        let path = format!("{}?id=eq.{}", SCAN_SESSIONS_TABLE, id);
        self.patch(&path, serde_json::to_value(update)?).await
    }

    pub async fn latest_scan_session(&self) -> Result<Option<ScanSessionRecord>, DbError> {
        let query = format!("{}?order=started_at.desc&limit=1", SCAN_SESSIONS_TABLE);
        Ok(self.get_rows(&query).await?.into_iter().next())
    }

    // -- counts --

    pub async fn count_rows(&self, table: &str) -> Result<u64, DbError> {
        let url = format!("{}/{}?select=id&limit=1", self.base, table);
        let response = self
            .http
            .get(&url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_status(response).await?;
        let total = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .unwrap_or(0);
        Ok(total)
    }

    // -- plumbing --

    async fn get_rows<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>, DbError> {
        let url = format!("{}/{}", self.base, query);
        let response = self.http.get(&url).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Reads a whole table in 1000-row pages so large libraries do not hit
    /// the PostgREST default row cap.
    async fn get_paged<T: DeserializeOwned>(
        &self,
        table: &str,
        order: &str,
    ) -> Result<Vec<T>, DbError> {
        const PAGE: usize = 1000;
        let mut rows = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = format!("{}?{}&limit={}&offset={}", table, order, PAGE, offset);
            let page: Vec<T> = self.get_rows(&query).await?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < PAGE {
                return Ok(rows);
            }
            offset += PAGE;
        }
    }

    async fn insert_id<T: Serialize>(&self, table: &'static str, record: &T) -> Result<i64, DbError> {
        let mut body = serde_json::to_value(record)?;
        sanitize_json(&mut body);
        let url = format!("{}/{}", self.base, table);
        let response = self.http.post(&url).json(&body).send().await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        let rows: Vec<RowId> = serde_json::from_str(&text)?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or(DbError::MissingRow(table))
    }

    async fn patch(&self, path: &str, mut body: Value) -> Result<(), DbError> {
        sanitize_json(&mut body);
        let url = format!("{}/{}", self.base, path);
        let response = self.http.patch(&url).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DbError::Status { status, body })
}

/// `eq.` filter value with percent-encoding, so artist names with spaces or
/// punctuation survive the query string.
pub fn eq_filter(value: &str) -> String {
    format!("eq.{}", url_escape(value))
}

pub fn url_escape(input: &str) -> String {
    let mut out = String::new();
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// PostgREST reports totals as `Content-Range: 0-0/1234`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_escape_keeps_unreserved_and_encodes_the_rest() {
        assert_eq!(url_escape("plain-name_1.0~x"), "plain-name_1.0~x");
        assert_eq!(url_escape("Above & Beyond"), "Above%20%26%20Beyond");
        assert_eq!(url_escape("a/b"), "a%2Fb");
    }

    #[test]
    fn eq_filter_prefixes_and_escapes() {
        assert_eq!(eq_filter("deep house"), "eq.deep%20house");
    }

    #[test]
    fn content_range_total_comes_after_the_slash() {
        assert_eq!(parse_content_range_total("0-0/1234"), Some(1234));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn pattern_update_serializes_only_set_fields() {
        let update = PatternUpdate {
            confidence: Some(0.75),
            sample_size: Some(4),
            ..PatternUpdate::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        let map = body.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("confidence"));
        assert!(map.contains_key("sample_size"));
    }

    #[test]
    fn scan_session_update_omits_unset_counters() {
        let update = ScanSessionUpdate {
            status: Some(ScanStatus::Completed),
            files_analyzed: Some(12),
            ..ScanSessionUpdate::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        let map = body.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["status"], "completed");
    }
}
