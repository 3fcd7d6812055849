//! Extraction of draw results from the numbers API and of first-prize shops
//! from the `tbl_data` listing table.

use crate::error::LottoError;
use crate::types::{
    DrawResult, MAX_NUMBER, MIN_NUMBER, NumbersResponse, RawDrawPayload, RawHtml, ShopRecord,
    UNKNOWN_SHOP_TYPE,
};
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

static LISTING_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.tbl_data").expect("static selector"));
static BODY_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody > tr").expect("static selector"));
static CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));

/// Header label that leaks into the body of some listing pages.
const HEADER_LABEL: &str = "전체 지역 상호";

pub fn parse_draw_payload(payload: &RawDrawPayload) -> Result<DrawResult, LottoError> {
    let response: NumbersResponse = serde_json::from_str(&payload.body)
        .map_err(|e| LottoError::MalformedPayload(format!("round {}: {}", payload.round, e)))?;

    let round = response.drw_no.ok_or_else(|| missing("drwNo"))?;
    if round == 0 || round != payload.round {
        return Err(LottoError::MalformedPayload(format!(
            "drwNo {} does not match requested round {}",
            round, payload.round
        )));
    }

    let date_text = response.drw_no_date.as_deref().ok_or_else(|| missing("drwNoDate"))?;
    let draw_date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d")
        .map_err(|e| LottoError::MalformedPayload(format!("drwNoDate '{date_text}': {e}")))?;

    let fields = [
        response.drwt_no1,
        response.drwt_no2,
        response.drwt_no3,
        response.drwt_no4,
        response.drwt_no5,
        response.drwt_no6,
    ];
    let mut numbers = [0u8; 6];
    for (i, field) in fields.into_iter().enumerate() {
        numbers[i] = field.ok_or_else(|| missing(&format!("drwtNo{}", i + 1)))?;
    }
    let bonus = response.bnus_no.ok_or_else(|| missing("bnusNo"))?;

    if let Some(bad) = numbers
        .iter()
        .chain(std::iter::once(&bonus))
        .find(|n| !(MIN_NUMBER..=MAX_NUMBER).contains(*n))
    {
        return Err(LottoError::MalformedPayload(format!(
            "number {bad} out of range in round {round}"
        )));
    }
    let distinct: HashSet<u8> = numbers.iter().copied().collect();
    if distinct.len() != numbers.len() {
        return Err(LottoError::MalformedPayload(format!(
            "duplicate numbers in round {round}: {numbers:?}"
        )));
    }

    Ok(DrawResult {
        round,
        draw_date,
        numbers,
        bonus,
        raw_payload: Some(payload.body.clone()),
    })
}

fn missing(field: &str) -> LottoError {
    LottoError::MalformedPayload(format!("missing field {field}"))
}

/// Column order of a listing row. Older pages prefix each row with a
/// sequence number; the layout is decided per row since dumps mix both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLayout {
    WithIndexColumn,
    WithoutIndexColumn,
}

impl ColumnLayout {
    pub fn detect(cells: &[String]) -> Self {
        let leading_index = cells
            .first()
            .is_some_and(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()));
        if leading_index && cells.len() >= 4 {
            ColumnLayout::WithIndexColumn
        } else {
            ColumnLayout::WithoutIndexColumn
        }
    }

    fn offset(self) -> usize {
        match self {
            ColumnLayout::WithIndexColumn => 1,
            ColumnLayout::WithoutIndexColumn => 0,
        }
    }
}

/// True for names that are page artifacts rather than shops: empty,
/// a "601~1185" style range, or the header label.
pub fn is_noise_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || name.contains(HEADER_LABEL) {
        return true;
    }

    let digits = name.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && name[digits..].trim_start().starts_with('~')
}

#[derive(Debug, PartialEq, Eq)]
enum RowOutcome {
    Shop {
        name: String,
        address: String,
        shop_type: String,
    },
    Noise,
    Malformed(String),
}

fn classify_row(cells: &[String]) -> RowOutcome {
    if cells.len() < 3 {
        return RowOutcome::Malformed(format!("expected at least 3 cells, got {}", cells.len()));
    }

    let offset = ColumnLayout::detect(cells).offset();
    let cell = |i: usize| cells.get(offset + i).map(|c| c.trim()).unwrap_or("");

    let name = cell(0);
    if is_noise_name(name) {
        return RowOutcome::Noise;
    }

    let shop_type = match cell(2) {
        "" => UNKNOWN_SHOP_TYPE,
        t => t,
    };

    RowOutcome::Shop {
        name: name.to_string(),
        address: cell(1).to_string(),
        shop_type: shop_type.to_string(),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First-prize shops listed in `html` for `round`.
///
/// Returns an empty Vec when the page holds no listing table or no usable
/// rows; the caller decides whether that is acceptable.
pub fn parse_shop_listing(html: &RawHtml, round: u32) -> Vec<ShopRecord> {
    parse_shop_listing_at(html, round, Utc::now())
}

pub fn parse_shop_listing_at(
    html: &RawHtml,
    round: u32,
    fetched_at: DateTime<Utc>,
) -> Vec<ShopRecord> {
    let document = Html::parse_document(&html.body);
    let Some(table) = document.select(&LISTING_TABLE).next() else {
        debug!("No listing table in {}", html.source);
        return Vec::new();
    };

    let mut shops = Vec::new();
    for (idx, tr) in table.select(&BODY_ROWS).enumerate() {
        let cells: Vec<String> = tr.select(&CELLS).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }

        match classify_row(&cells) {
            RowOutcome::Shop {
                name,
                address,
                shop_type,
            } => shops.push(ShopRecord {
                round,
                name,
                address,
                shop_type,
                fetched_at,
                source: html.source.clone(),
            }),
            RowOutcome::Noise => debug!("Dropped noise row {} in {}", idx, html.source),
            RowOutcome::Malformed(reason) => {
                warn!("Skipping row {} in {}: {}", idx, html.source, reason)
            }
        }
    }

    if shops.is_empty() {
        warn!("No shop rows parsed for round {} from {}", round, html.source);
    }
    shops
}

/// Parses saved listing pages and drops exact `(round, name, address, type)`
/// duplicates across files, keeping the first file's record.
pub fn merge_dump_files(files: &[RawHtml], round: u32) -> Vec<ShopRecord> {
    let fetched_at = Utc::now();
    let mut seen: HashSet<(u32, String, String, String)> = HashSet::new();
    let mut merged = Vec::new();

    for file in files {
        let shops = parse_shop_listing_at(file, round, fetched_at);
        debug!("Parsed {} rows from {}", shops.len(), file.source);
        for shop in shops {
            let key = (
                shop.round,
                shop.name.clone(),
                shop.address.clone(),
                shop.shop_type.clone(),
            );
            if seen.insert(key) {
                merged.push(shop);
            }
        }
    }

    merged
}
