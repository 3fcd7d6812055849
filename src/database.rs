use crate::connection::conn;
use crate::error::LottoError;
use crate::types::{DrawResult, MAX_NUMBER, NumberFrequency, ShopRecord};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, types::Type};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    round INTEGER PRIMARY KEY,
    draw_date TEXT NOT NULL,
    n1 INTEGER NOT NULL, n2 INTEGER NOT NULL, n3 INTEGER NOT NULL,
    n4 INTEGER NOT NULL, n5 INTEGER NOT NULL, n6 INTEGER NOT NULL,
    bonus INTEGER NOT NULL,
    raw_json TEXT,
    fetched_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS shops (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    round INTEGER NOT NULL REFERENCES draws (round),
    name TEXT NOT NULL,
    address TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    source TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_shops_round ON shops (round);

CREATE TABLE IF NOT EXISTS number_frequency (
    number INTEGER PRIMARY KEY,
    frequency INTEGER NOT NULL DEFAULT 0,
    bonus_frequency INTEGER NOT NULL DEFAULT 0,
    last_drawn INTEGER NOT NULL DEFAULT 0,
    not_drawn_weeks INTEGER NOT NULL DEFAULT 0
);
";

const DRAW_COLUMNS: &str = "round, draw_date, n1, n2, n3, n4, n5, n6, bonus, raw_json";

/// SQLite-backed persistence for draws, winning shops and number statistics.
///
/// Holds only the database path; every operation opens its own connection
/// and drops it before returning.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    shop_ttl_days: i64,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and ensures the schema.
    pub fn open(path: impl AsRef<Path>, shop_ttl_days: i64) -> Result<Self, LottoError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            shop_ttl_days,
        };
        store.connect()?.execute_batch(SCHEMA)?;
        debug!("Opened lottery database at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shop_ttl_days(&self) -> i64 {
        self.shop_ttl_days
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        conn(&self.path)
    }

    pub fn upsert_draw(&self, draw: &DrawResult) -> Result<(), LottoError> {
        let conn = self.connect()?;
        let [n1, n2, n3, n4, n5, n6] = draw.numbers;
        conn.execute(
            "INSERT INTO draws (round, draw_date, n1, n2, n3, n4, n5, n6, bonus, raw_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(round) DO UPDATE SET
                draw_date = excluded.draw_date,
                n1 = excluded.n1, n2 = excluded.n2, n3 = excluded.n3,
                n4 = excluded.n4, n5 = excluded.n5, n6 = excluded.n6,
                bonus = excluded.bonus,
                raw_json = excluded.raw_json,
                fetched_at = excluded.fetched_at",
            rusqlite::params![
                draw.round,
                draw.draw_date.format("%Y-%m-%d").to_string(),
                n1,
                n2,
                n3,
                n4,
                n5,
                n6,
                draw.bonus,
                draw.raw_payload,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_draw(&self, round: u32) -> Result<Option<DrawResult>, LottoError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRAW_COLUMNS} FROM draws WHERE round = ?1"
        ))?;
        let draw = stmt.query_row([round], draw_from_row).optional()?;
        Ok(draw)
    }

    /// Most recent draws first.
    pub fn recent_rounds(&self, limit: usize) -> Result<Vec<DrawResult>, LottoError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRAW_COLUMNS} FROM draws ORDER BY round DESC LIMIT ?1"
        ))?;
        let draw_iter = stmt.query_map([limit], draw_from_row)?;

        let mut results = Vec::new();
        for draw in draw_iter {
            results.push(draw?);
        }
        Ok(results)
    }

    pub fn latest_round(&self) -> Result<Option<u32>, LottoError> {
        let conn = self.connect()?;
        let latest: Option<u32> =
            conn.query_row("SELECT MAX(round) FROM draws", [], |row| row.get(0))?;
        Ok(latest)
    }

    pub fn draw_count(&self) -> Result<usize, LottoError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// The first `limit` rounds in `1..=upper_bound` with no stored draw,
    /// ascending, plus how many rounds in that range are missing in total.
    pub fn missing_rounds(
        &self,
        upper_bound: u32,
        limit: usize,
    ) -> Result<(Vec<u32>, u64), LottoError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT round FROM draws WHERE round BETWEEN 1 AND ?1")?;
        let known = stmt
            .query_map([upper_bound], |row| row.get::<_, u32>(0))?
            .collect::<rusqlite::Result<HashSet<u32>>>()?;

        let total = u64::from(upper_bound) - known.len() as u64;
        let rounds = (1..=upper_bound)
            .filter(|r| !known.contains(r))
            .take(limit)
            .collect();
        Ok((rounds, total))
    }

    pub fn get_shops(&self, round: u32) -> Result<Vec<ShopRecord>, LottoError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT round, name, address, type, fetched_at, source
             FROM shops WHERE round = ?1 ORDER BY name, address, id",
        )?;
        let shop_iter = stmt.query_map([round], shop_from_row)?;

        let mut results = Vec::new();
        for shop in shop_iter {
            results.push(shop?);
        }
        Ok(results)
    }

    /// Replaces every shop row of `round` with `shops` in one transaction.
    ///
    /// Records are stored under `round` whatever their own `round` field says.
    pub fn replace_shops(&self, round: u32, shops: &[ShopRecord]) -> Result<(), LottoError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM shops WHERE round = ?1", [round])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO shops (round, name, address, type, fetched_at, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for shop in shops {
                stmt.execute((
                    round,
                    &shop.name,
                    &shop.address,
                    &shop.shop_type,
                    shop.fetched_at.timestamp(),
                    &shop.source,
                ))?;
            }
        }
        tx.commit()?;

        debug!(
            "Replaced shops for round {}: removed {}, inserted {}",
            round,
            removed,
            shops.len()
        );
        Ok(())
    }

    /// Whether the shop cache of `round` is missing or older than `ttl_days`.
    pub fn is_stale(&self, round: u32, ttl_days: i64) -> Result<bool, LottoError> {
        self.is_stale_at(round, ttl_days, Utc::now())
    }

    pub fn is_stale_at(
        &self,
        round: u32,
        ttl_days: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, LottoError> {
        let conn = self.connect()?;
        let (count, oldest): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(fetched_at) FROM shops WHERE round = ?1",
            [round],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if count == 0 {
            return Ok(true);
        }
        // A TTL too large to subtract from `now` never expires.
        let cutoff = Duration::try_days(ttl_days).and_then(|ttl| now.checked_sub_signed(ttl));
        Ok(match (oldest, cutoff) {
            (Some(oldest), Some(cutoff)) => oldest < cutoff.timestamp(),
            (Some(_), None) => false,
            (None, _) => true,
        })
    }

    /// Rebuilds `number_frequency` from every stored draw.
    ///
    /// Always writes all numbers 1..=45, zero counts included.
    pub fn recompute_frequency_table(&self) -> Result<Vec<NumberFrequency>, LottoError> {
        let mut conn = self.connect()?;
        let size = MAX_NUMBER as usize + 1;
        let mut frequency = vec![0u32; size];
        let mut bonus_frequency = vec![0u32; size];
        let mut last_drawn = vec![0u32; size];
        let mut latest = 0u32;

        {
            let mut stmt = conn
                .prepare("SELECT round, n1, n2, n3, n4, n5, n6, bonus FROM draws ORDER BY round")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let round: u32 = row.get(0)?;
                for idx in 1..=6 {
                    let n: u8 = row.get(idx)?;
                    if let Some(slot) = frequency.get_mut(n as usize) {
                        *slot += 1;
                        last_drawn[n as usize] = round;
                    }
                }
                let bonus: u8 = row.get(7)?;
                if let Some(slot) = bonus_frequency.get_mut(bonus as usize) {
                    *slot += 1;
                }
                latest = latest.max(round);
            }
        }

        let table: Vec<NumberFrequency> = (1..=MAX_NUMBER)
            .map(|number| {
                let n = number as usize;
                let last = last_drawn[n];
                NumberFrequency {
                    number,
                    frequency: frequency[n],
                    bonus_frequency: bonus_frequency[n],
                    last_drawn: last,
                    not_drawn_weeks: if last > 0 { latest - last } else { latest },
                }
            })
            .collect();

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO number_frequency
                    (number, frequency, bonus_frequency, last_drawn, not_drawn_weeks)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(number) DO UPDATE SET
                    frequency = excluded.frequency,
                    bonus_frequency = excluded.bonus_frequency,
                    last_drawn = excluded.last_drawn,
                    not_drawn_weeks = excluded.not_drawn_weeks",
            )?;
            for row in &table {
                stmt.execute((
                    row.number,
                    row.frequency,
                    row.bonus_frequency,
                    row.last_drawn,
                    row.not_drawn_weeks,
                ))?;
            }
        }
        tx.commit()?;

        info!("Recomputed number frequency table up to round {}", latest);
        Ok(table)
    }

    pub fn frequency_table(&self) -> Result<Vec<NumberFrequency>, LottoError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT number, frequency, bonus_frequency, last_drawn, not_drawn_weeks
             FROM number_frequency ORDER BY number",
        )?;
        let freq_iter = stmt.query_map([], |row| {
            Ok(NumberFrequency {
                number: row.get(0)?,
                frequency: row.get(1)?,
                bonus_frequency: row.get(2)?,
                last_drawn: row.get(3)?,
                not_drawn_weeks: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for freq in freq_iter {
            results.push(freq?);
        }
        Ok(results)
    }
}

fn draw_from_row(row: &Row<'_>) -> rusqlite::Result<DrawResult> {
    let date_text: String = row.get(1)?;
    let draw_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(DrawResult {
        round: row.get(0)?,
        draw_date,
        numbers: [
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ],
        bonus: row.get(8)?,
        raw_payload: row.get(9)?,
    })
}

fn shop_from_row(row: &Row<'_>) -> rusqlite::Result<ShopRecord> {
    let fetched_at: i64 = row.get(4)?;
    let fetched_at = DateTime::from_timestamp(fetched_at, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, fetched_at))?;

    Ok(ShopRecord {
        round: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        shop_type: row.get(3)?,
        fetched_at,
        source: row.get(5)?,
    })
}
