use crate::config::Config;
use crate::error::LottoError;
use crate::types::{NumbersResponse, RawDrawPayload, RawHtml};
use crate::utils::retry_with_backoff;
use chrono::NaiveDate;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Attempts per numbers request before giving up.
pub const DRAW_FETCH_ATTEMPTS: u32 = 3;
/// Backoff unit between numbers attempts (`1.2s * attempt`).
pub const DRAW_FETCH_BACKOFF: Duration = Duration::from_millis(1200);

/// Saturday of round 1.
pub const FIRST_DRAW_DATE: (i32, u32, u32) = (2002, 12, 7);

/// Where draw numbers and winning-shop pages come from.
pub trait DrawSource: Send + Sync {
    /// Numbers JSON for `round`. `NotFound` when the round is not drawn yet.
    fn fetch_draw_numbers(
        &self,
        round: u32,
    ) -> impl Future<Output = Result<RawDrawPayload, LottoError>> + Send;

    /// First-prize shop listing page for `round`.
    fn fetch_shop_listing_html(
        &self,
        round: u32,
    ) -> impl Future<Output = Result<RawHtml, LottoError>> + Send;
}

/// Fetches from the dhlottery site over HTTP.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    numbers_url: String,
    shops_url: String,
    attempts: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, LottoError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            numbers_url: config.numbers_url.clone(),
            shops_url: config.shops_url.clone(),
            attempts: DRAW_FETCH_ATTEMPTS,
            backoff: DRAW_FETCH_BACKOFF,
        })
    }

    /// Overrides the numbers retry schedule.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn numbers_url(&self, round: u32) -> String {
        format!("{}&drwNo={}", self.numbers_url, round)
    }

    pub fn shops_url(&self, round: u32) -> String {
        format!("{}&drwNo={}", self.shops_url, round)
    }

    async fn try_fetch_draw_numbers(&self, round: u32) -> Result<RawDrawPayload, LottoError> {
        let url = self.numbers_url(round);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LottoError::Network(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let body = response.text().await?;
        interpret_numbers_body(round, body)
    }
}

impl DrawSource for HttpFetcher {
    async fn fetch_draw_numbers(&self, round: u32) -> Result<RawDrawPayload, LottoError> {
        retry_with_backoff(self.attempts, self.backoff, |attempt| {
            debug!("Fetching numbers for round {} (attempt {})", round, attempt);
            self.try_fetch_draw_numbers(round)
        })
        .await
    }

    async fn fetch_shop_listing_html(&self, round: u32) -> Result<RawHtml, LottoError> {
        let url = self.shops_url(round);
        debug!("Fetching shop listing for round {}", round);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LottoError::Network(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        // The site declares EUC-KR; a charset in Content-Type still wins.
        let body = response.text_with_charset("euc-kr").await?;
        if body.trim().is_empty() {
            return Err(LottoError::Network(format!("empty body from {url}")));
        }

        Ok(RawHtml { source: url, body })
    }
}

/// Classifies a numbers response body.
///
/// An undecodable body is treated as a transient failure; a decoded body
/// without `returnValue == "success"` means the round does not exist yet.
pub fn interpret_numbers_body(round: u32, body: String) -> Result<RawDrawPayload, LottoError> {
    let response: NumbersResponse = serde_json::from_str(&body).map_err(|e| {
        LottoError::Network(format!("undecodable numbers body for round {round}: {e}"))
    })?;

    if !response.is_success() {
        return Err(LottoError::NotFound(round));
    }

    Ok(RawDrawPayload { round, body })
}

/// Round number expected to be drawn by `reference`, counting the week of
/// the first draw as round 1. Only a starting point for probing.
pub fn estimate_latest_round(reference: NaiveDate) -> u32 {
    let (y, m, d) = FIRST_DRAW_DATE;
    let Some(anchor) = NaiveDate::from_ymd_opt(y, m, d) else {
        return 1;
    };

    let days = (reference - anchor).num_days();
    if days < 0 {
        return 1;
    }
    (days / 7) as u32 + 1
}
