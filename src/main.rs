mod datasets;
mod db;
mod error;
mod fetch;
mod filter;
mod normalize;
mod session;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use datasets::DATASETS;
use fetch::{HttpSource, Proxy, DEFAULT_PROXY_BASE};
use filter::{Filter, FilterOptions};
use normalize::year::YearPeriod;
use session::{LoadSession, Origin};

#[derive(Parser)]
#[command(name = "tpe_moto", about = "Taipei motorcycle traffic rules from data.taipei")]
struct Cli {
    /// SQLite file holding the cached snapshot
    #[arg(long, global = true, env = "TPE_MOTO_DB", default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    /// Route requests through a CORS-style proxy
    #[arg(long, global = true, env = "TPE_MOTO_PROXY")]
    proxy: bool,
    /// Proxy prefix; the target URL is appended percent-encoded
    #[arg(long, global = true, env = "TPE_MOTO_PROXY_BASE", default_value = DEFAULT_PROXY_BASE)]
    proxy_base: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all datasets (or reuse the cached snapshot) and report counts
    Load {
        /// Ignore the cached snapshot
        #[arg(short, long)]
        refresh: bool,
    },
    /// Filtered table of normalized records
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Ignore the cached snapshot
        #[arg(short, long)]
        refresh: bool,
    },
    /// Raw source fields of the n-th row of a filtered list
    Show {
        /// Row number as printed by `list`
        index: usize,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Available filter values
    Filters,
    /// Snapshot age and per-dataset counts
    Stats,
    /// Delete the cached snapshot
    Clear,
}

#[derive(Args)]
struct FilterArgs {
    /// Dataset label (see `filters`)
    #[arg(short, long)]
    category: Option<String>,
    /// District name, e.g. 大安區
    #[arg(short, long)]
    district: Option<String>,
    /// before2009, year_<YYYY> or unknownFrom2009
    #[arg(short, long)]
    year: Option<YearPeriod>,
    /// Substring of location or district
    #[arg(short, long)]
    query: Option<String>,
}

impl From<FilterArgs> for Filter {
    fn from(a: FilterArgs) -> Self {
        Filter {
            category: a.category,
            district: a.district,
            period: a.year,
            query: a.query,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let proxy = cli.proxy.then(|| Proxy {
        base: cli.proxy_base.clone(),
    });

    let conn = db::connect(&cli.db)
        .with_context(|| format!("Failed to open {}", cli.db.display()))?;
    db::init_schema(&conn)?;
    let source = HttpSource::new();

    let result = match cli.command {
        Commands::Load { refresh } => {
            let s = session::load_or_cached(&conn, &source, DATASETS, proxy.as_ref(), refresh).await?;
            print_summary(&s);
            Ok(())
        }
        Commands::List {
            filter,
            limit,
            refresh,
        } => {
            let s = session::load_or_cached(&conn, &source, DATASETS, proxy.as_ref(), refresh).await?;
            let rows = Filter::from(filter).apply(&s.records);
            if rows.is_empty() {
                println!("No records match.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<14} | {:<12} | {:<30} | {:<14}",
                "#", "Category", "District", "Location", "Year"
            );
            println!("{}", "-".repeat(86));
            for (i, r) in rows.iter().take(limit).enumerate() {
                println!(
                    "{:>4} | {:<14} | {:<12} | {:<30} | {:<14}",
                    i + 1,
                    truncate(&r.category, 14),
                    truncate(&r.district_display, 12),
                    truncate(&r.location, 30),
                    r.year_display
                );
            }
            if rows.len() > limit {
                println!("... {} more (use -n)", rows.len() - limit);
            }
            println!("\n{} of {} records", rows.len(), s.records.len());
            Ok(())
        }
        Commands::Show { index, filter } => {
            let s = session::load_or_cached(&conn, &source, DATASETS, proxy.as_ref(), false).await?;
            let rows = Filter::from(filter).apply(&s.records);
            let r = index
                .checked_sub(1)
                .and_then(|i| rows.get(i))
                .with_context(|| format!("No row #{} ({} rows match)", index, rows.len()))?;
            println!("{} / {} / {}", r.category, r.district_display, r.location);
            println!("Source: {}", r.source);
            if !r.notes.is_empty() {
                println!("Notes:  {}", r.notes);
            }
            println!("{}", serde_json::to_string_pretty(&r.raw)?);
            Ok(())
        }
        Commands::Filters => {
            let s = session::load_or_cached(&conn, &source, DATASETS, proxy.as_ref(), false).await?;
            let opts = FilterOptions::from_records(DATASETS, &s.records);
            println!("Categories:");
            for c in &opts.categories {
                println!("  {}", c);
            }
            println!("Districts:");
            for d in &opts.districts {
                println!("  {}", d);
            }
            println!("Years:");
            for p in &opts.periods {
                println!("  {:<16} {}", p.to_string(), p.label());
            }
            Ok(())
        }
        Commands::Stats => match db::load_snapshot(&conn)? {
            Some(snapshot) => {
                print_summary(&LoadSession::from_snapshot(snapshot));
                Ok(())
            }
            None => {
                println!("No cached snapshot. Run 'load' first.");
                Ok(())
            }
        },
        Commands::Clear => {
            if db::clear_snapshot(&conn)? {
                println!("Snapshot removed.");
            } else {
                println!("Nothing to remove.");
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

fn print_summary(s: &LoadSession) {
    let origin = match s.origin {
        Origin::Fetched => "fetched",
        Origin::Cache => "cached",
    };
    println!(
        "{} records from {} datasets ({}, {})",
        s.records.len(),
        s.raw.len(),
        origin,
        s.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    for cap in &s.raw {
        println!("  {:<24} {:>6} rows  {}", cap.id, cap.rows.len(), cap.label);
    }
    for id in &s.failed {
        println!("  {:<24} failed", id);
    }

    let mut by_period: BTreeMap<YearPeriod, usize> = BTreeMap::new();
    for r in &s.records {
        *by_period.entry(r.year_period).or_default() += 1;
    }
    println!("Years:");
    for (p, n) in by_period {
        println!("  {:<24} {:>6}", p.label(), n);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
