use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_NUMBER: u8 = 1;
pub const MAX_NUMBER: u8 = 45;

/// Shop category used when the listing has no sale type.
pub const UNKNOWN_SHOP_TYPE: &str = "미상";

/// Body of the numbers API, as returned by dhlottery.
///
/// Every field is optional so that a missing one can be reported instead of
/// silently defaulted.
#[derive(Deserialize, Debug)]
pub struct NumbersResponse {
    #[serde(rename = "returnValue")]
    pub return_value: Option<String>,
    #[serde(rename = "drwNo")]
    pub drw_no: Option<u32>,
    #[serde(rename = "drwNoDate")]
    pub drw_no_date: Option<String>,
    #[serde(rename = "drwtNo1")]
    pub drwt_no1: Option<u8>,
    #[serde(rename = "drwtNo2")]
    pub drwt_no2: Option<u8>,
    #[serde(rename = "drwtNo3")]
    pub drwt_no3: Option<u8>,
    #[serde(rename = "drwtNo4")]
    pub drwt_no4: Option<u8>,
    #[serde(rename = "drwtNo5")]
    pub drwt_no5: Option<u8>,
    #[serde(rename = "drwtNo6")]
    pub drwt_no6: Option<u8>,
    #[serde(rename = "bnusNo")]
    pub bnus_no: Option<u8>,
}

impl NumbersResponse {
    pub fn is_success(&self) -> bool {
        self.return_value.as_deref() == Some("success")
    }
}

/// JSON text of a successful numbers response.
#[derive(Debug, Clone)]
pub struct RawDrawPayload {
    pub round: u32,
    pub body: String,
}

/// An HTML document and where it came from (URL or dump file name).
#[derive(Debug, Clone)]
pub struct RawHtml {
    pub source: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub round: u32,
    pub draw_date: NaiveDate,
    pub numbers: [u8; 6],
    pub bonus: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub round: u32,
    pub name: String,
    pub address: String,
    #[serde(rename = "type")]
    pub shop_type: String,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberFrequency {
    pub number: u8,
    pub frequency: u32,
    pub bonus_frequency: u32,
    /// Round of the most recent appearance, 0 if never drawn.
    pub last_drawn: u32,
    pub not_drawn_weeks: u32,
}

/// Outcome of syncing a single round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub draw: DrawResult,
    pub shops_refreshed: bool,
    pub shop_count: usize,
}

/// Outcome of a batch sync (`ensure_latest`, `backfill_missing`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub latest: Option<u32>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(u32, String)>,
}

impl SyncReport {
    pub fn record_failure(&mut self, round: u32, reason: impl Into<String>) {
        self.failures.push((round, reason.into()));
    }
}
