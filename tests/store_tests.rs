mod common;

use chrono::{Duration, Utc};
use common::{draw, temp_store};
use lotto_lib::database::Store;
use lotto_lib::types::ShopRecord;

fn shop(round: u32, name: &str, address: &str, kind: &str) -> ShopRecord {
    ShopRecord {
        round,
        name: name.into(),
        address: address.into(),
        shop_type: kind.into(),
        fetched_at: Utc::now(),
        source: "test".into(),
    }
}

#[test]
fn upsert_draw_is_idempotent() {
    let (store, _dir) = temp_store();
    let d = draw(1185);

    store.upsert_draw(&d).unwrap();
    store.upsert_draw(&d).unwrap();

    assert_eq!(store.draw_count().unwrap(), 1);
    assert_eq!(store.get_draw(1185).unwrap(), Some(d));
}

#[test]
fn upsert_draw_overwrites_fields() {
    let (store, _dir) = temp_store();
    let mut d = draw(10);
    store.upsert_draw(&d).unwrap();

    d.bonus = 44;
    d.raw_payload = Some("{\"returnValue\":\"success\"}".into());
    store.upsert_draw(&d).unwrap();

    let stored = store.get_draw(10).unwrap().unwrap();
    assert_eq!(stored.bonus, 44);
    assert_eq!(stored.raw_payload.as_deref(), Some("{\"returnValue\":\"success\"}"));
}

#[test]
fn get_draw_missing_round() {
    let (store, _dir) = temp_store();
    assert_eq!(store.get_draw(1).unwrap(), None);
    assert_eq!(store.latest_round().unwrap(), None);
}

#[test]
fn recent_rounds_are_descending() {
    let (store, _dir) = temp_store();
    for round in [3, 1, 5, 2, 4] {
        store.upsert_draw(&draw(round)).unwrap();
    }

    let rounds: Vec<u32> = store
        .recent_rounds(3)
        .unwrap()
        .iter()
        .map(|d| d.round)
        .collect();
    assert_eq!(rounds, vec![5, 4, 3]);
    assert_eq!(store.latest_round().unwrap(), Some(5));
}

#[test]
fn missing_rounds_lists_gaps() {
    let (store, _dir) = temp_store();
    for round in [1, 2, 4, 7] {
        store.upsert_draw(&draw(round)).unwrap();
    }
    assert_eq!(store.missing_rounds(8, usize::MAX).unwrap(), (vec![3, 5, 6, 8], 4));
    assert_eq!(store.missing_rounds(8, 2).unwrap(), (vec![3, 5], 4));
    assert_eq!(store.missing_rounds(0, 10).unwrap(), (vec![], 0));
}

#[test]
fn missing_rounds_with_huge_upper_bound() {
    let (store, _dir) = temp_store();
    store.upsert_draw(&draw(2)).unwrap();

    let (rounds, total) = store.missing_rounds(4_000_000_000, 3).unwrap();
    assert_eq!(rounds, vec![1, 3, 4]);
    assert_eq!(total, 3_999_999_999);
}

#[test]
fn replace_shops_replaces_only_that_round() {
    let (store, _dir) = temp_store();
    store.upsert_draw(&draw(1)).unwrap();
    store.upsert_draw(&draw(2)).unwrap();

    store
        .replace_shops(1, &[shop(1, "가", "서울", "자동"), shop(1, "나", "부산", "수동")])
        .unwrap();
    store.replace_shops(2, &[shop(2, "다", "대구", "자동")]).unwrap();
    assert_eq!(store.get_shops(1).unwrap().len(), 2);

    store.replace_shops(1, &[shop(1, "라", "인천", "반자동")]).unwrap();

    let first = store.get_shops(1).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "라");
    assert_eq!(first[0].shop_type, "반자동");
    assert_eq!(store.get_shops(2).unwrap().len(), 1);
}

#[test]
fn replace_shops_files_records_under_given_round() {
    let (store, _dir) = temp_store();
    store.replace_shops(7, &[shop(99, "가", "서울", "자동")]).unwrap();

    assert_eq!(store.get_shops(7).unwrap()[0].round, 7);
    assert!(store.get_shops(99).unwrap().is_empty());
}

#[test]
fn replace_shops_keeps_duplicate_rows() {
    let (store, _dir) = temp_store();
    let row = shop(3, "가", "서울", "자동");
    store.replace_shops(3, &[row.clone(), row]).unwrap();
    assert_eq!(store.get_shops(3).unwrap().len(), 2);
}

#[test]
fn is_stale_without_shops() {
    let (store, _dir) = temp_store();
    store.upsert_draw(&draw(5)).unwrap();
    assert!(store.is_stale(5, 30).unwrap());
}

#[test]
fn is_stale_follows_ttl() {
    let (store, _dir) = temp_store();
    store.replace_shops(5, &[shop(5, "가", "서울", "자동")]).unwrap();

    let now = Utc::now();
    assert!(!store.is_stale_at(5, 30, now).unwrap());
    assert!(!store.is_stale_at(5, 30, now + Duration::days(29)).unwrap());
    assert!(store.is_stale_at(5, 30, now + Duration::days(31)).unwrap());
}

#[test]
fn is_stale_with_unbounded_ttl() {
    let (store, _dir) = temp_store();
    assert!(store.is_stale(5, 100_000_000).unwrap());

    store.replace_shops(5, &[shop(5, "가", "서울", "자동")]).unwrap();
    assert!(!store.is_stale(5, 100_000_000).unwrap());
    assert!(!store.is_stale(5, i64::MAX).unwrap());
}

#[test]
fn is_stale_uses_oldest_row() {
    let (store, _dir) = temp_store();
    let mut old = shop(5, "가", "서울", "자동");
    old.fetched_at = Utc::now() - Duration::days(40);
    store
        .replace_shops(5, &[old, shop(5, "나", "부산", "수동")])
        .unwrap();

    assert!(store.is_stale(5, 30).unwrap());
}

#[test]
fn frequency_table_on_empty_store() {
    let (store, _dir) = temp_store();
    let table = store.recompute_frequency_table().unwrap();

    assert_eq!(table.len(), 45);
    assert!(table.iter().all(|row| row.frequency == 0 && row.bonus_frequency == 0));
    assert!(table.iter().all(|row| row.last_drawn == 0 && row.not_drawn_weeks == 0));
    assert_eq!(store.frequency_table().unwrap(), table);
}

#[test]
fn frequency_table_counts_one_draw() {
    let (store, _dir) = temp_store();
    let mut d = draw(1);
    d.numbers = [1, 2, 3, 4, 5, 6];
    d.bonus = 7;
    store.upsert_draw(&d).unwrap();

    let table = store.recompute_frequency_table().unwrap();
    let total: u32 = table.iter().map(|row| row.frequency).sum();
    let bonus_total: u32 = table.iter().map(|row| row.bonus_frequency).sum();
    assert_eq!(total, 6);
    assert_eq!(bonus_total, 1);

    assert_eq!(table[0].frequency, 1);
    assert_eq!(table[0].last_drawn, 1);
    assert_eq!(table[6].frequency, 0);
    assert_eq!(table[6].bonus_frequency, 1);
}

#[test]
fn frequency_table_not_drawn_weeks() {
    let (store, _dir) = temp_store();
    let rounds = [
        (1, [1, 2, 3, 4, 5, 6]),
        (2, [1, 7, 8, 9, 10, 11]),
        (3, [7, 12, 13, 14, 15, 16]),
    ];
    for (round, numbers) in rounds {
        let mut d = draw(round);
        d.numbers = numbers;
        d.bonus = 45;
        store.upsert_draw(&d).unwrap();
    }

    let table = store.recompute_frequency_table().unwrap();
    let row = |n: usize| &table[n - 1];

    assert_eq!(row(1).frequency, 2);
    assert_eq!(row(1).last_drawn, 2);
    assert_eq!(row(1).not_drawn_weeks, 1);
    assert_eq!(row(7).not_drawn_weeks, 0);
    assert_eq!(row(2).not_drawn_weeks, 2);
    // Never drawn as a main number: counted from the first round.
    assert_eq!(row(45).frequency, 0);
    assert_eq!(row(45).bonus_frequency, 3);
    assert_eq!(row(45).not_drawn_weeks, 3);
}

#[test]
fn reopen_keeps_data() {
    let (store, dir) = temp_store();
    store.upsert_draw(&draw(42)).unwrap();

    let reopened = Store::open(dir.path().join("lotto.db"), 30).unwrap();
    assert_eq!(reopened.latest_round().unwrap(), Some(42));
}
