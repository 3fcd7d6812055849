use crate::api::{DrawSource, estimate_latest_round};
use crate::config::MIN_REQUEST_DELAY;
use crate::database::Store;
use crate::error::LottoError;
use crate::parser::{merge_dump_files, parse_draw_payload, parse_shop_listing};
use crate::types::{RawHtml, RoundSummary, ShopRecord, SyncReport};
use crate::utils::save_dump;
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Most rounds a single backfill run will sync.
pub const BACKFILL_CAP: usize = 200;
/// How far below an overshooting estimate the latest-round probe looks.
pub const MAX_PROBE_BACKTRACK: u32 = 8;
/// How far past its start the latest-round probe walks before giving up.
pub const MAX_PROBE_AHEAD: u32 = 104;

/// Keeps the store in line with upstream draws and winning shops.
pub struct SyncUseCase<S> {
    store: Arc<Store>,
    source: S,
    request_delay: Duration,
    dump_dir: Option<PathBuf>,
}

impl<S: DrawSource> SyncUseCase<S> {
    pub fn new(store: Arc<Store>, source: S, request_delay: Duration) -> Self {
        Self {
            store,
            source,
            request_delay: request_delay.max(MIN_REQUEST_DELAY),
            dump_dir: None,
        }
    }

    /// Save every fetched shop page under `dir`.
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn pause(&self) {
        tokio::time::sleep(self.request_delay).await;
    }

    /// Refreshes the draw of `round` and, when forced or stale, its shops.
    pub async fn ensure_round(
        &self,
        round: u32,
        force_shop_refresh: bool,
    ) -> Result<RoundSummary, LottoError> {
        let payload = self.source.fetch_draw_numbers(round).await?;
        let draw = parse_draw_payload(&payload)?;
        self.store.upsert_draw(&draw)?;
        info!(
            "Round {} ({}): {:?} + {}",
            draw.round, draw.draw_date, draw.numbers, draw.bonus
        );

        let ttl_days = self.store.shop_ttl_days();
        let need_shop_fetch = force_shop_refresh || self.store.is_stale(round, ttl_days)?;
        if !need_shop_fetch {
            let shop_count = self.store.get_shops(round)?.len();
            debug!("Round {}: using cached shops (TTL {} days)", round, ttl_days);
            return Ok(RoundSummary {
                draw,
                shops_refreshed: false,
                shop_count,
            });
        }

        self.pause().await;
        let html = self.source.fetch_shop_listing_html(round).await?;
        if let Some(dir) = &self.dump_dir {
            match save_dump(dir, round, &html.body) {
                Ok(path) => debug!("Saved shop page to {}", path.display()),
                Err(e) => warn!("Could not save shop page for round {}: {}", round, e),
            }
        }

        let shops = parse_shop_listing(&html, round);
        if shops.is_empty() {
            let shop_count = self.store.get_shops(round)?.len();
            warn!(
                "Round {}: shop page yielded no rows, keeping {} cached shops",
                round, shop_count
            );
            return Ok(RoundSummary {
                draw,
                shops_refreshed: false,
                shop_count,
            });
        }

        self.store.replace_shops(round, &shops)?;
        info!("Round {}: stored {} winning shops", round, shops.len());
        Ok(RoundSummary {
            draw,
            shops_refreshed: true,
            shop_count: shops.len(),
        })
    }

    /// Syncs the `count` most recent rounds, confirming the latest upstream.
    pub async fn ensure_latest(&self, count: u32) -> Result<SyncReport, LottoError> {
        self.ensure_latest_as_of(count, Local::now().date_naive())
            .await
    }

    pub async fn ensure_latest_as_of(
        &self,
        count: u32,
        today: NaiveDate,
    ) -> Result<SyncReport, LottoError> {
        let known = self.store.latest_round()?.unwrap_or(1);
        let start = known.max(estimate_latest_round(today));
        let latest = self.probe_latest(start).await?;
        info!("Confirmed latest round {}", latest);

        let rounds: Vec<u32> = if count == 0 {
            Vec::new()
        } else {
            let first = latest.saturating_sub(count - 1).max(1);
            (first..=latest).collect()
        };

        let mut report = self.sync_rounds(&rounds).await?;
        report.latest = Some(latest);
        Ok(report)
    }

    /// Walks forward from `start` until a round is not found. If `start`
    /// itself is missing the estimate overshot, so step back instead.
    async fn probe_latest(&self, start: u32) -> Result<u32, LottoError> {
        let mut confirmed = None;
        let mut probe = start;
        while probe <= start.saturating_add(MAX_PROBE_AHEAD) {
            let result = self.source.fetch_draw_numbers(probe).await;
            self.pause().await;
            match result {
                Ok(_) => {
                    debug!("Probe: round {} exists", probe);
                    confirmed = Some(probe);
                    probe += 1;
                }
                Err(LottoError::NotFound(_)) => break,
                Err(e) => {
                    warn!("Probe of round {} failed: {}", probe, e);
                    break;
                }
            }
        }
        if let Some(latest) = confirmed {
            return Ok(latest);
        }

        let known = self.store.latest_round()?;
        let floor = start
            .saturating_sub(MAX_PROBE_BACKTRACK)
            .max(known.unwrap_or(1));
        for round in (floor..start).rev() {
            let result = self.source.fetch_draw_numbers(round).await;
            self.pause().await;
            match result {
                Ok(_) => return Ok(round),
                Err(LottoError::NotFound(_)) => debug!("Probe: round {} not drawn yet", round),
                Err(e) => warn!("Probe of round {} failed: {}", round, e),
            }
        }

        known.ok_or(LottoError::NotFound(start))
    }

    /// Syncs up to [`BACKFILL_CAP`] rounds in `1..=upper_bound` missing from the store.
    pub async fn backfill_missing(&self, upper_bound: u32) -> Result<SyncReport, LottoError> {
        let (batch, total_missing) = self.store.missing_rounds(upper_bound, BACKFILL_CAP)?;
        info!(
            "{} rounds missing up to {}, syncing {}",
            total_missing,
            upper_bound,
            batch.len()
        );

        let mut report = self.sync_rounds(&batch).await?;
        report.latest = self.store.latest_round()?;
        Ok(report)
    }

    async fn sync_rounds(&self, rounds: &[u32]) -> Result<SyncReport, LottoError> {
        let mut report = SyncReport::default();

        for (i, &round) in rounds.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            report.attempted += 1;

            match self.ensure_round(round, false).await {
                Ok(summary) => {
                    report.succeeded += 1;
                    debug!(
                        "Round {} synced (shops refreshed: {}, {} shops)",
                        round, summary.shops_refreshed, summary.shop_count
                    );
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e @ LottoError::NotFound(_)) => {
                    info!("Round {} skipped: {}", round, e);
                    report.record_failure(round, e.to_string());
                }
                Err(e) => {
                    warn!("Round {} failed: {}", round, e);
                    report.record_failure(round, e.to_string());
                }
            }
        }

        if report.succeeded > 0 {
            self.store.recompute_frequency_table()?;
        }
        info!(
            "Sync finished: {}/{} rounds succeeded",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Merges saved shop pages for `round`; with `save`, they replace the
    /// stored shops of that round.
    pub fn import_dumps(
        &self,
        round: u32,
        files: &[RawHtml],
        save: bool,
    ) -> Result<Vec<ShopRecord>, LottoError> {
        let merged = merge_dump_files(files, round);
        info!(
            "Merged {} shops for round {} from {} files",
            merged.len(),
            round,
            files.len()
        );

        if save {
            if merged.is_empty() {
                warn!("Nothing to save for round {}", round);
            } else {
                self.store.replace_shops(round, &merged)?;
            }
        }
        Ok(merged)
    }
}
