pub mod api;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod parser;
pub mod types;
pub mod use_cases;
pub mod utils;

pub use api::{DrawSource, HttpFetcher};
pub use config::Config;
pub use database::Store;
pub use error::LottoError;
pub use types::*;
pub use use_cases::SyncUseCase;
