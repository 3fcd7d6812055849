use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lotto_lib::api::{HttpFetcher, estimate_latest_round};
use lotto_lib::config::{self, Config};
use lotto_lib::database::Store;
use lotto_lib::types::{DrawResult, ShopRecord, SyncReport};
use lotto_lib::use_cases::SyncUseCase;
use lotto_lib::utils::{DUMP_FILE_SUFFIX, list_dump_files, read_dump, write_shops_csv};

#[derive(Parser)]
#[command(name = "lotto-sync", version, about = "Lotto 6/45 draw and winning shop cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    InitDb,

    /// Sync one round's draw and winning shops
    FetchRound {
        round: u32,

        /// Refetch shops even if the cache is fresh
        #[arg(long, default_value_t = false)]
        force_shops: bool,
    },

    /// Confirm the latest round upstream and sync the most recent ones
    FetchLatest {
        #[arg(default_value_t = 1)]
        count: u32,
    },

    /// Sync rounds missing from the database
    Backfill {
        /// Highest round to consider (defaults to the latest known round)
        #[arg(long)]
        upper: Option<u32>,
    },

    /// Print a stored round and its shops
    ShowRound {
        round: u32,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the most recent stored rounds
    ShowLatest {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Refetch and replace the shops of a round
    RebuildShops { round: u32 },

    /// Merge saved shop pages of a round into one deduplicated list
    MergeDumps {
        #[arg(long)]
        round: u32,

        /// Directory holding saved pages (defaults to LOTTO_DUMP_DIR, then ".")
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long, default_value = DUMP_FILE_SUFFIX)]
        suffix: String,

        /// Write the merged list as CSV
        #[arg(long)]
        out: Option<PathBuf>,

        /// Replace the stored shops of the round with the merged list
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// Print counts and number frequencies
    Stats,
}

#[derive(Serialize)]
struct RoundView<'a> {
    draw: &'a DrawResult,
    shops: &'a [ShopRecord],
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = config::load()?;
    let store = Arc::new(
        Store::open(&config.database_path, config.shop_ttl_days)
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );

    match cli.command {
        Commands::InitDb => {
            println!("🗄️ Database ready at {}", store.path().display());
        }
        Commands::FetchRound { round, force_shops } => {
            let sync = sync_use_case(&config, &store)?;
            let summary = sync
                .ensure_round(round, force_shops)
                .await
                .with_context(|| format!("syncing round {round}"))?;
            store.recompute_frequency_table()?;
            print_draw(&summary.draw);
            println!(
                "   shops: {} ({})",
                summary.shop_count,
                if summary.shops_refreshed { "refreshed" } else { "cached" }
            );
        }
        Commands::FetchLatest { count } => {
            let sync = sync_use_case(&config, &store)?;
            let report = sync.ensure_latest(count).await?;
            print_report(&report);
        }
        Commands::Backfill { upper } => {
            let upper = match upper {
                Some(upper) => upper,
                None => store
                    .latest_round()?
                    .unwrap_or_else(|| estimate_latest_round(Local::now().date_naive())),
            };
            let sync = sync_use_case(&config, &store)?;
            let report = sync.backfill_missing(upper).await?;
            print_report(&report);
        }
        Commands::ShowRound { round, json } => {
            let Some(draw) = store.get_draw(round)? else {
                anyhow::bail!("round {round} is not stored; run fetch-round {round} first");
            };
            let shops = store.get_shops(round)?;
            if json {
                let view = RoundView {
                    draw: &draw,
                    shops: &shops,
                };
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_draw(&draw);
                for shop in &shops {
                    println!("   [{}] {} / {}", shop.shop_type, shop.name, shop.address);
                }
                println!("   {} winning shops", shops.len());
            }
        }
        Commands::ShowLatest { limit, json } => {
            let draws = store.recent_rounds(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&draws)?);
            } else if draws.is_empty() {
                println!("No draws stored yet.");
            } else {
                draws.iter().for_each(print_draw);
            }
        }
        Commands::RebuildShops { round } => {
            let sync = sync_use_case(&config, &store)?;
            let summary = sync.ensure_round(round, true).await?;
            println!("🏪 Round {}: {} winning shops", round, summary.shop_count);
        }
        Commands::MergeDumps {
            round,
            dir,
            suffix,
            out,
            save,
        } => {
            let dir = dir
                .or_else(|| config.dump_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let mut files = Vec::new();
            for path in list_dump_files(&dir, &suffix)? {
                let dump =
                    read_dump(&path).with_context(|| format!("reading {}", path.display()))?;
                files.push(dump);
            }
            if files.is_empty() {
                anyhow::bail!("no *{suffix} files in {}", dir.display());
            }

            let sync = sync_use_case(&config, &store)?;
            let merged = sync.import_dumps(round, &files, save)?;
            match out {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_shops_csv(file, &merged)?;
                    println!("📄 Wrote {} shops to {}", merged.len(), path.display());
                }
                None => write_shops_csv(std::io::stdout(), &merged)?,
            }
        }
        Commands::Stats => {
            let latest = store.latest_round()?;
            println!("Draws stored: {}", store.draw_count()?);
            match latest {
                Some(latest) => println!("Latest round: {latest}"),
                None => println!("Latest round: -"),
            }

            let mut table = store.frequency_table()?;
            if table.is_empty() {
                table = store.recompute_frequency_table()?;
            }
            println!("{:>3} {:>6} {:>6} {:>6} {:>6}", "no", "hits", "bonus", "last", "idle");
            for row in &table {
                println!(
                    "{:>3} {:>6} {:>6} {:>6} {:>6}",
                    row.number, row.frequency, row.bonus_frequency, row.last_drawn, row.not_drawn_weeks
                );
            }
        }
    }

    Ok(())
}

fn sync_use_case(config: &Config, store: &Arc<Store>) -> Result<SyncUseCase<HttpFetcher>> {
    let fetcher = HttpFetcher::new(config).context("building HTTP client")?;
    Ok(
        SyncUseCase::new(Arc::clone(store), fetcher, config.request_delay)
            .with_dump_dir(config.dump_dir.clone()),
    )
}

fn print_draw(draw: &DrawResult) {
    let numbers: Vec<String> = draw.numbers.iter().map(|n| n.to_string()).collect();
    println!(
        "🎟️ Round {} ({}): {} + {}",
        draw.round,
        draw.draw_date,
        numbers.join(" "),
        draw.bonus
    );
}

fn print_report(report: &SyncReport) {
    if let Some(latest) = report.latest {
        println!("Latest round: {latest}");
    }
    println!(
        "✅ Synced {}/{} rounds",
        report.succeeded, report.attempted
    );
    for (round, reason) in &report.failures {
        println!("❌ Round {round}: {reason}");
    }
}
