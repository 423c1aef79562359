//! Allocboard CLI: leaderboards and allocation analytics over one snapshot.
//!
//! Commands:
//! - `leaderboard`: rank users in one of six modes
//! - `diversification` / `popularity` / `concentration` / `risk`: allocation tables
//! - `user` / `week`: per-user and per-week summaries
//! - `snapshot`: collection counts, fetch tiers used, fingerprint
//! - `market-validate`: check a market document against the snapshot schema
//! - `generate`: write a synthetic contest as a fixture directory

use std::path::{Path, PathBuf};

use allocboard_core::{
    AnalyticsSnapshot, Collection, MarketSnapshot, MemoryStore, ResilientFetcher, WeekId,
};
use allocboard_engine::export::{
    concentration_csv, diversification_csv, export_json, leaderboard_csv, popularity_csv,
    risk_csv,
};
use allocboard_engine::{EngineConfig, Leaderboard, LeaderboardMode, RankingEngine, SyntheticContest};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "allocboard",
    about = "Allocboard CLI: weekly allocation contest analytics"
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Fixture directory holding `{collection}.json` files.
    #[arg(long, global = true, conflicts_with = "synthetic")]
    data_dir: Option<PathBuf>,

    /// Use a generated demo contest instead of a fixture directory.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    /// Seed for `--synthetic`.
    #[arg(long, global = true, default_value = "allocboard")]
    seed: String,

    /// Engine config (TOML). Defaults apply to every missing key.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank users: latest-week, overall, recent[:N], week:YYYY-Www, win-rate[:N], annualized[:N].
    Leaderboard {
        mode: String,

        /// Only print the first N rows.
        #[arg(long)]
        top: Option<usize>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Average held instruments per allocation, per user.
    Diversification {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Instrument usage across all allocations.
    Popularity {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Herfindahl concentration index and top-3 share.
    Concentration {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Maximum single-instrument weight and risk tier, per user.
    Risk {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// All-time performance of one user.
    User {
        uid: String,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Summary and ranking of one week.
    Week {
        week: String,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Collection counts, fetch tiers and fingerprint of the loaded snapshot.
    Snapshot {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Validate a market document (structured or legacy flat layout).
    MarketValidate { file: PathBuf },
    /// Write a synthetic contest to a fixture directory.
    Generate {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 25)]
        users: usize,

        #[arg(long, default_value_t = 12)]
        weeks: usize,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::MarketValidate { file } => return run_market_validate(file),
        Commands::Generate { out, users, weeks } => {
            return run_generate(&cli.source.seed, out, *users, *weeks)
        }
        _ => {}
    }

    let config = load_config(cli.source.config.as_deref())?;
    let snapshot = load_snapshot(&cli.source, &config)?;
    let fingerprint = snapshot.fingerprint();
    let engine = RankingEngine::new(&snapshot, config);

    match cli.command {
        Commands::Leaderboard { mode, top, format } => {
            let mode = LeaderboardMode::parse_with_default(&mode, engine.config().default_window)?;
            let mut board = engine.leaderboard(mode);
            if let Some(n) = top {
                board.rows.truncate(n);
            }
            match format {
                Format::Table => print_leaderboard(&board),
                Format::Json => println!("{}", export_json("leaderboard", &fingerprint, &board)?),
                Format::Csv => print!("{}", leaderboard_csv(&board)?),
            }
        }
        Commands::Diversification { format } => {
            let rows = engine
                .allocation_stats()
                .diversification_table(engine.known_users());
            match format {
                Format::Table => {
                    println!("{:<24} {:>11} {:>16}", "User", "Allocations", "Avg Instruments");
                    println!("{}", "-".repeat(53));
                    for r in &rows {
                        let avg = r
                            .avg_instrument_count
                            .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
                        println!(
                            "{:<24} {:>11} {:>16}",
                            engine.display_name(&r.uid),
                            r.allocations,
                            avg
                        );
                    }
                }
                Format::Json => println!("{}", export_json("diversification", &fingerprint, &rows)?),
                Format::Csv => print!("{}", diversification_csv(&rows)?),
            }
        }
        Commands::Popularity { format } => {
            let rows = engine
                .allocation_stats()
                .popularity_table(&engine.snapshot().instruments);
            match format {
                Format::Table => {
                    println!("{:<10} {:<28} {:>7} {:>12} {:>10}", "Code", "Name", "Count", "Total Wt", "Avg Wt");
                    println!("{}", "-".repeat(71));
                    for r in &rows {
                        println!(
                            "{:<10} {:<28} {:>7} {:>12.3} {:>10.3}",
                            r.code,
                            r.name.as_deref().unwrap_or("-"),
                            r.count,
                            r.total_weight,
                            r.avg_weight
                        );
                    }
                }
                Format::Json => println!("{}", export_json("popularity", &fingerprint, &rows)?),
                Format::Csv => print!("{}", popularity_csv(&rows)?),
            }
        }
        Commands::Concentration { format } => {
            let summary = engine.allocation_stats().concentration();
            match format {
                Format::Table => {
                    println!("Unique instruments:  {}", summary.unique_instruments);
                    println!("Total usage:         {}", summary.total_usage);
                    println!("Top-3 share:         {:.2}%", summary.top3_share);
                    println!("Concentration index: {:.2}", summary.concentration_index);
                }
                Format::Json => println!("{}", export_json("concentration", &fingerprint, &summary)?),
                Format::Csv => print!("{}", concentration_csv(&summary)?),
            }
        }
        Commands::Risk { format } => {
            let rows = engine.allocation_stats().risk_table();
            match format {
                Format::Table => {
                    println!("{:<24} {:>10} {:>8}", "User", "Max Wt", "Tier");
                    println!("{}", "-".repeat(44));
                    for r in &rows {
                        println!(
                            "{:<24} {:>10.3} {:>8}",
                            engine.display_name(&r.uid),
                            r.max_single_weight,
                            r.risk_tier
                        );
                    }
                }
                Format::Json => println!("{}", export_json("risk", &fingerprint, &rows)?),
                Format::Csv => print!("{}", risk_csv(&rows)?),
            }
        }
        Commands::User { uid, format } => {
            let Some(perf) = engine.user_performance(&uid) else {
                bail!("unknown user '{uid}'");
            };
            match format {
                Format::Json => println!("{}", export_json("user", &fingerprint, &perf)?),
                Format::Table | Format::Csv => {
                    println!("=== {} ({}) ===", perf.display_name, perf.uid);
                    println!("Weeks played:   {} ({} up, {} down, {} flat)", perf.weeks_played, perf.wins, perf.losses, perf.flat);
                    println!("Compounded:     {}", pct(perf.compounded_return));
                    println!("Win rate:       {}", pct(perf.win_rate));
                    println!("Annualized:     {}", pct(perf.annualized_return));
                    println!("Current streak: {}", perf.current_streak);
                    println!("Latest balance: {:.2}", perf.latest_balance);
                    if let Some(best) = perf.best_week {
                        println!("Best week:      {} {:+.2}%", best.week_id, best.return_pct);
                    }
                    if let Some(worst) = perf.worst_week {
                        println!("Worst week:     {} {:+.2}%", worst.week_id, worst.return_pct);
                    }
                }
            }
        }
        Commands::Week { week, format } => {
            let week: WeekId = week.parse()?;
            let summary = engine.week_summary(week);
            let board = engine.by_week(week);
            match format {
                Format::Json => {
                    let payload = json!({"summary": summary, "leaderboard": board});
                    println!("{}", export_json("week", &fingerprint, &payload)?);
                }
                Format::Csv => print!("{}", leaderboard_csv(&board)?),
                Format::Table => {
                    println!("=== {} ===", summary.week_id);
                    println!("Participants: {}", summary.participants);
                    println!("Mean return:  {}", pct(summary.mean_return));
                    println!("Median:       {}", pct(summary.median_return));
                    println!("Win rate:     {}", pct(summary.win_rate));
                    println!();
                    print_leaderboard(&board);
                }
            }
        }
        Commands::Snapshot { format } => print_snapshot(engine.snapshot(), &fingerprint, format)?,
        Commands::MarketValidate { .. } | Commands::Generate { .. } => {}
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_snapshot(source: &SourceArgs, config: &EngineConfig) -> Result<AnalyticsSnapshot> {
    let store = match (&source.data_dir, source.synthetic) {
        (Some(dir), _) => MemoryStore::from_json_dir(dir)
            .with_context(|| format!("failed to load fixture directory {}", dir.display()))?,
        (None, true) => SyntheticContest::new(source.seed.as_str()).generate(),
        (None, false) => bail!("one of --data-dir or --synthetic is required"),
    };

    let fetcher = ResilientFetcher::new(store, config.fetch_policy());
    let snapshot = config.snapshot_loader().load(&fetcher);
    if snapshot.degraded() {
        warn!("snapshot served by fallback tiers; see `allocboard snapshot` for details");
    }
    Ok(snapshot)
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.2}%"))
}

fn print_leaderboard(board: &Leaderboard) {
    let weeks: Vec<String> = board.weeks.iter().map(|w| w.to_string()).collect();
    println!("Mode:  {}", board.mode);
    if !weeks.is_empty() {
        println!("Weeks: {}", weeks.join(", "));
    }
    if board.is_empty() {
        println!("(no rows)");
        return;
    }
    println!();
    println!(
        "{:<5} {:<24} {:>22} {:>6} {:>14}",
        "Rank",
        "User",
        board.mode.metric_label(),
        "Weeks",
        "End Balance"
    );
    println!("{}", "-".repeat(75));
    for r in &board.rows {
        let end = r
            .end_balance
            .map_or_else(|| "-".to_string(), |b| format!("{b:.2}"));
        println!(
            "{:<5} {:<24} {:>22.4} {:>6} {:>14}",
            r.rank, r.display_name, r.metric, r.weeks_counted, end
        );
    }
}

fn print_snapshot(snapshot: &AnalyticsSnapshot, fingerprint: &str, format: Format) -> Result<()> {
    if format == Format::Json {
        let collections: Vec<_> = Collection::ALL
            .iter()
            .map(|c| {
                json!({
                    "collection": c.name(),
                    "records": snapshot.len(*c),
                    "skipped": snapshot.skipped(*c),
                    "report": snapshot.report(*c),
                })
            })
            .collect();
        let payload = json!({
            "degraded": snapshot.degraded(),
            "balanceWeeks": snapshot.balance_weeks,
            "collections": collections,
        });
        println!("{}", export_json("snapshot", fingerprint, &payload)?);
        return Ok(());
    }

    println!("Fingerprint: {fingerprint}");
    println!("Degraded:    {}", snapshot.degraded());
    if let Some(weeks) = &snapshot.balance_weeks {
        let ids: Vec<String> = weeks.iter().map(WeekId::to_string).collect();
        println!("Window:      {}", ids.join(", "));
    }
    println!();
    println!("{:<16} {:>8} {:>8} {:<16}", "Collection", "Records", "Skipped", "Served By");
    println!("{}", "-".repeat(51));
    for c in Collection::ALL {
        let report = snapshot.report(c);
        let served = match report {
            Some(r) if r.permission_denied => "denied".to_string(),
            Some(r) => r
                .served_by
                .map_or_else(|| "empty".to_string(), |s| s.to_string()),
            None => "-".to_string(),
        };
        println!(
            "{:<16} {:>8} {:>8} {:<16}",
            c.name(),
            snapshot.len(c),
            snapshot.skipped(c),
            served
        );
    }
    Ok(())
}

fn run_market_validate(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let market = MarketSnapshot::from_json_str(&text)
        .with_context(|| format!("{} is not a valid market document", file.display()))?;

    println!("Valid: {} instruments", market.instruments.len());
    if let Some(window) = &market.meta.window {
        println!("Window: {window}");
    }
    if let Some(source) = &market.meta.source {
        println!("Source: {source}");
    }
    println!();
    println!("{:<10} {:>12} {:>12} {:>10}", "Code", "Open", "Close", "Return");
    println!("{}", "-".repeat(47));
    for (code, q) in market.ranked() {
        println!("{:<10} {:>12.4} {:>12.4} {:>9.2}%", code, q.open, q.close, q.return_pct);
    }
    Ok(())
}

fn run_generate(seed: &str, out: &Path, users: usize, weeks: usize) -> Result<()> {
    let store = SyntheticContest::new(seed)
        .with_users(users)
        .with_weeks(weeks)
        .generate();
    store
        .write_json_dir(out)
        .with_context(|| format!("failed to write fixture directory {}", out.display()))?;
    info!(dir = %out.display(), users, weeks, "synthetic contest written");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────
