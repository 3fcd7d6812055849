use crate::error::LottoError;
use crate::types::{RawHtml, ShopRecord};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// File name suffix of saved shop listing pages.
pub const DUMP_FILE_SUFFIX: &str = "tbl_data.debug.html";

/// Backoff before retry number `attempt + 1`: `base * attempt`.
pub fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Runs `op` up to `max_attempts` times, sleeping `linear_backoff(base, n)`
/// after the n-th failed attempt. Only retryable errors are retried.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    base: Duration,
    mut op: F,
) -> Result<T, LottoError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LottoError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = linear_backoff(base, attempt);
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, max_attempts, e, wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Dump files in `dir` whose name ends with `suffix`, sorted by name.
pub fn list_dump_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, LottoError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads a saved shop page. Invalid UTF-8 bytes are replaced rather than
/// failing the whole merge.
pub fn read_dump(path: &Path) -> Result<RawHtml, LottoError> {
    let bytes = fs::read(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(RawHtml {
        source,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Writes a fetched shop page so it can be merged again later.
pub fn save_dump(dir: &Path, round: u32, html: &str) -> Result<PathBuf, LottoError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "shops_{}_{}.{}",
        round,
        chrono::Utc::now().timestamp(),
        DUMP_FILE_SUFFIX
    ));
    fs::write(&path, html)?;
    Ok(path)
}

pub fn write_shops_csv<W: std::io::Write>(writer: W, shops: &[ShopRecord]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["round", "store", "address", "type", "source"])?;
    for shop in shops {
        wtr.write_record([
            shop.round.to_string().as_str(),
            shop.name.as_str(),
            shop.address.as_str(),
            shop.shop_type.as_str(),
            shop.source.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
