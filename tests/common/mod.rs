#![allow(dead_code)]

use chrono::NaiveDate;
use lotto_lib::api::DrawSource;
use lotto_lib::database::Store;
use lotto_lib::error::LottoError;
use lotto_lib::types::{DrawResult, RawDrawPayload, RawHtml};
use std::collections::HashSet;
use std::sync::Mutex;
use tempfile::TempDir;

pub fn temp_store() -> (Store, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("lotto.db"), 30).unwrap();
    (store, dir)
}

pub fn anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2002, 12, 7).unwrap()
}

pub fn draw_date(round: u32) -> NaiveDate {
    anchor() + chrono::Duration::weeks(round as i64 - 1)
}

/// Deterministic, duplicate-free numbers for `round`.
pub fn numbers_for(round: u32) -> [u8; 6] {
    let base = (round % 40) as u8;
    [base + 1, base + 2, base + 3, base + 4, base + 5, base + 6]
}

pub fn bonus_for(round: u32) -> u8 {
    if numbers_for(round).contains(&45) { 1 } else { 45 }
}

pub fn draw(round: u32) -> DrawResult {
    DrawResult {
        round,
        draw_date: draw_date(round),
        numbers: numbers_for(round),
        bonus: bonus_for(round),
        raw_payload: None,
    }
}

pub fn numbers_json(round: u32) -> String {
    let [n1, n2, n3, n4, n5, n6] = numbers_for(round);
    serde_json::json!({
        "returnValue": "success",
        "drwNo": round,
        "drwNoDate": draw_date(round).format("%Y-%m-%d").to_string(),
        "drwtNo1": n1, "drwtNo2": n2, "drwtNo3": n3,
        "drwtNo4": n4, "drwtNo5": n5, "drwtNo6": n6,
        "bnusNo": bonus_for(round),
    })
    .to_string()
}

pub fn shop_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(i, (name, address, kind))| {
            format!(
                "<tr><td>{}</td><td>{name}</td><td>{address}</td><td>{kind}</td></tr>",
                i + 1
            )
        })
        .collect();
    format!(
        "<html><body><table class=\"tbl_data\"><thead><tr><th>번호</th><th>상호명</th>\
         <th>소재지</th><th>구분</th></tr></thead><tbody>{body}</tbody></table></body></html>"
    )
}

pub fn default_shop_page() -> String {
    shop_page(&[
        ("행운복권", "서울 강남구 테헤란로 1", "자동"),
        ("대박로또", "부산 해운대구 해운대로 2", "수동"),
    ])
}

#[derive(Default)]
pub struct Calls {
    pub numbers: Vec<u32>,
    pub shops: Vec<u32>,
}

/// In-memory upstream: rounds `1..=latest` exist.
pub struct FakeSource {
    pub latest: u32,
    pub failing: HashSet<u32>,
    pub shop_html: String,
    pub calls: Mutex<Calls>,
}

impl FakeSource {
    pub fn new(latest: u32) -> Self {
        Self {
            latest,
            failing: HashSet::new(),
            shop_html: default_shop_page(),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn failing_on(mut self, round: u32) -> Self {
        self.failing.insert(round);
        self
    }

    pub fn with_shop_html(mut self, html: String) -> Self {
        self.shop_html = html;
        self
    }

    pub fn numbers_calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().numbers.clone()
    }

    pub fn shop_calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().shops.clone()
    }
}

impl DrawSource for FakeSource {
    async fn fetch_draw_numbers(&self, round: u32) -> Result<RawDrawPayload, LottoError> {
        self.calls.lock().unwrap().numbers.push(round);
        if self.failing.contains(&round) {
            return Err(LottoError::Network(format!("HTTP 503 for round {round}")));
        }
        if round == 0 || round > self.latest {
            return Err(LottoError::NotFound(round));
        }
        Ok(RawDrawPayload {
            round,
            body: numbers_json(round),
        })
    }

    async fn fetch_shop_listing_html(&self, round: u32) -> Result<RawHtml, LottoError> {
        self.calls.lock().unwrap().shops.push(round);
        Ok(RawHtml {
            source: format!("fake://shops/{round}"),
            body: self.shop_html.clone(),
        })
    }
}
