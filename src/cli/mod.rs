//! IntelliInspect CLI
//!
//! Runs the server, trains a model offline or prepares a CSV with synthetic
//! timestamps.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{
    add_synthetic_timestamps, read_csv_path, resolve_column, write_csv, ColumnConfig, DataLoader,
    TimeRange, TrainTestRanges,
};
use crate::store::{FileModelStore, ModelStore};
use crate::training::{Trainer, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 52; // box inner width

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim(&format!("┌{}┐", "─".repeat(W + 2)))); }
fn line_box_bottom() { println!("  {}", dim(&format!("└{}┘", "─".repeat(W + 2)))); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {} {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(W)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "intelli-inspect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-windowed pass/fail classifier service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host
        #[arg(long)]
        host: Option<String>,

        /// Directory for the processed dataset and saved ranges
        #[arg(long)]
        data_dir: Option<String>,

        /// Directory for the trained model
        #[arg(long)]
        models_dir: Option<String>,
    },

    /// Train a model from a CSV file and save it
    Train {
        /// Input CSV with a timestamp column
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        train_start: String,

        #[arg(long)]
        train_end: String,

        #[arg(long)]
        test_start: String,

        #[arg(long)]
        test_end: String,

        /// Output directory for the model files
        #[arg(long, default_value = "./models")]
        models_dir: PathBuf,

        /// Skip undersampling of the majority class
        #[arg(long)]
        no_balance: bool,
    },

    /// Append synthetic one-second timestamps to a CSV
    AddTimestamps {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub struct TrainArgs<'a> {
    pub data: &'a Path,
    pub train_start: &'a str,
    pub train_end: &'a str,
    pub test_start: &'a str,
    pub test_end: &'a str,
    pub models_dir: &'a Path,
    pub balance: bool,
}

pub fn cmd_train(args: TrainArgs<'_>) -> anyhow::Result<()> {
    section("Train");

    let ranges = TrainTestRanges {
        train: TimeRange::parse(args.train_start, args.train_end)?,
        test: TimeRange::parse(args.test_start, args.test_end)?,
    };

    step_run("Loading data");
    let start = Instant::now();
    let dataset = DataLoader::default().load_csv_path(args.data)?;
    step_done(&format!("{} rows × {} cols in {:?}", dataset.height(), dataset.width(), start.elapsed()));

    step_run("Training booster");
    let start = Instant::now();
    let config = TrainingConfig {
        balance_classes: args.balance,
        ..Default::default()
    };
    let outcome = Trainer::new(config).train(&dataset, ranges)?;
    step_done(&format!("{:?}", start.elapsed()));

    step_run("Saving model");
    let store = FileModelStore::new(args.models_dir);
    store.save(&outcome.model, &outcome.history)?;
    step_done(&store.model_path().display().to_string());

    let r = outcome.report;
    println!();
    println!("  {:<16} {}", muted("Model"), outcome.model.model_id.white());
    println!("  {:<16} {}", muted("Train rows"), outcome.model.train_rows.to_string().white());
    println!("  {:<16} {}", muted("Test rows"), outcome.model.test_rows.to_string().white());
    println!("  {:<16} {}", muted("Accuracy"), format!("{:.4}", r.accuracy).white().bold());
    println!("  {:<16} {}", muted("Precision"), format!("{:.4}", r.precision).white());
    println!("  {:<16} {}", muted("Recall"), format!("{:.4}", r.recall).white());
    println!("  {:<16} {}", muted("F1"), format!("{:.4}", r.f1_score).white());
    println!();

    Ok(())
}

pub fn cmd_add_timestamps(input: &Path, output: &Path) -> anyhow::Result<()> {
    section("Add timestamps");

    let columns = ColumnConfig::default();
    let mut df = read_csv_path(input)?;

    if resolve_column(&df, &columns.target).is_none() {
        anyhow::bail!("'{}' column not found in {}", columns.target, input.display());
    }

    if resolve_column(&df, &columns.timestamp).is_some() {
        println!("  {} {}", muted("›"), "timestamp column already present, copying as is".white());
    } else {
        add_synthetic_timestamps(&mut df, &columns.timestamp)?;
    }

    write_csv(&mut df, output)?;
    println!("  {} {} {}", ok("✓"), "wrote".white(), output.display());
    println!();
    Ok(())
}

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<String>,
    models_dir: Option<String>,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if data_dir.is_some() || models_dir.is_some() {
        let data = data_dir.unwrap_or_else(|| config.data_dir.clone());
        let models = models_dir.unwrap_or_else(|| config.models_dir.clone());
        config = config.with_dirs(data, models);
    }

    println!();
    line_box_top();
    line_box(&format!("{} {}", "IntelliInspect".white().bold(), dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box(&kv("API    ", &format!("http://{}:{}/api", config.host, config.port)));
    line_box(&kv("Health ", &format!("http://{}:{}/api/health", config.host, config.port)));
    line_box(&kv("Data   ", &config.data_dir));
    line_box(&kv("Models ", &config.models_dir));
    line_box(&format!("{}", dim("ctrl+c to stop")));
    line_box_bottom();
    println!();

    run_server(config).await
}
