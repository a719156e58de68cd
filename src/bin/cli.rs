//! Tally CLI
//!
//! Command-line client for a running Tally server:
//! - Trigger weekly runs and backfills
//! - Inspect sources, summaries and the run log
//! - Publish the weekly report

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tally-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Weekly metrics ingestion from SaaS tools")]
#[command(long_about = "Tally pulls weekly attendance, email, video, group and task metrics\nfrom your SaaS tools, stores them in SQLite and posts a weekly snapshot.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run sources for a week (default: the previous complete week)
    Run {
        /// First day of the week (YYYY-MM-DD)
        #[arg(long)]
        week_start: Option<String>,
        /// Last day of the week (YYYY-MM-DD)
        #[arg(long)]
        week_end: Option<String>,
        /// Backfill this many weeks ending at the selected week
        #[arg(short, long)]
        weeks: Option<u32>,
        /// Only run this source
        #[arg(short, long)]
        source: Option<String>,
        /// Fetch and summarize without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show server health and source status
    Status,

    /// List stored weekly summaries
    Summaries {
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short, long)]
        dimension: Option<String>,
        /// Only this week, by its first day
        #[arg(long)]
        week_start: Option<String>,
        /// Weeks starting on or after this date
        #[arg(long)]
        from: Option<String>,
        /// Weeks starting on or before this date
        #[arg(long)]
        to: Option<String>,
    },

    /// Show the dashboard for a week with YoY deltas
    Dashboard {
        #[arg(long)]
        week_start: Option<String>,
        #[arg(long)]
        week_end: Option<String>,
    },

    /// Show recent pipeline runs
    Runs {
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Post the weekly snapshot to chat
    Publish {
        #[arg(long)]
        week_start: Option<String>,
        #[arg(long)]
        week_end: Option<String>,
        /// Print the message without posting
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Run {
            week_start,
            week_end,
            weeks,
            source,
            dry_run,
        } => {
            let body = serde_json::json!({
                "week_start": week_start,
                "week_end": week_end,
                "weeks": weeks,
                "source": source,
                "dry_run": dry_run,
            });

            let response = client
                .post(format!("{}/api/v1/runs", cli.api_url))
                .json(&body)
                .send()
                .await;
            let result = expect_json(response, &cli.api_url).await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_run_reports(&result, dry_run);
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;
            let health = expect_json(response, &cli.api_url).await?;

            let sources = client
                .get(format!("{}/api/v1/sources", cli.api_url))
                .send()
                .await;
            let sources = expect_json(sources, &cli.api_url).await?;

            if cli.format == "json" {
                let combined = serde_json::json!({ "health": health, "sources": sources });
                println!("{}", serde_json::to_string_pretty(&combined)?);
                return Ok(());
            }

            println!("Tally v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("API Status: {}", str_field(&health, "status"));
            println!("Storage: {}", str_field(&health, "storage"));
            if let Some(uptime) = health["uptime_seconds"].as_u64() {
                println!("Uptime: {}", format_duration(uptime));
            }
            if let Some(next) = sources["next_run_at"].as_str() {
                println!("Next weekly run: {}", next);
            }

            println!();
            println!(
                "{:<16} {:<12} {:<10} {:<12} {:<12} {}",
                "Source", "Family", "State", "Last run", "Latest data", "Last status"
            );
            println!("{}", "-".repeat(80));
            for source in sources["sources"].as_array().into_iter().flatten() {
                let last = &source["last_run"];
                println!(
                    "{:<16} {:<12} {:<10} {:<12} {:<12} {}",
                    str_field(source, "name"),
                    str_field(source, "family"),
                    str_field(&source["state"], "state"),
                    last["period_start"].as_str().unwrap_or("never"),
                    source["latest_period"]["start"].as_str().unwrap_or("none"),
                    last["status"].as_str().unwrap_or("-"),
                );
            }
        }

        Commands::Summaries {
            source,
            dimension,
            week_start,
            from,
            to,
        } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            for (key, value) in [
                ("source", source),
                ("dimension", dimension),
                ("week_start", week_start),
                ("from", from),
                ("to", to),
            ] {
                if let Some(value) = value {
                    query.push((key, value));
                }
            }
            if cli.format == "csv" {
                query.push(("format", "csv".to_string()));
            }

            let response = client
                .get(format!("{}/api/v1/summaries", cli.api_url))
                .query(&query)
                .send()
                .await?;

            if !response.status().is_success() {
                fail(response).await;
            }

            match cli.format.as_str() {
                "csv" => print!("{}", response.text().await?),
                "json" => {
                    let data: Value = response.json().await?;
                    println!("{}", serde_json::to_string_pretty(&data)?);
                }
                _ => {
                    let data: Value = response.json().await?;
                    print_summaries(&data);
                }
            }
        }

        Commands::Dashboard {
            week_start,
            week_end,
        } => {
            let response = client
                .get(format!("{}/api/v1/dashboard", cli.api_url))
                .query(&week_query(week_start, week_end))
                .send()
                .await;
            let data = expect_json(response, &cli.api_url).await?;

            match cli.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&data)?),
                "csv" => print_dashboard_csv(&data)?,
                _ => print_dashboard(&data),
            }
        }

        Commands::Runs { source, limit } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(source) = source {
                query.push(("source", source));
            }

            let response = client
                .get(format!("{}/api/v1/runs", cli.api_url))
                .query(&query)
                .send()
                .await;
            let data = expect_json(response, &cli.api_url).await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
                return Ok(());
            }

            let runs = data["runs"].as_array().cloned().unwrap_or_default();
            if runs.is_empty() {
                println!("No runs recorded yet.");
                println!();
                println!("Trigger one with:");
                println!("  tally-cli run");
                return Ok(());
            }

            println!(
                "{:<22} {:<14} {:<12} {:<10} {:>8}  {}",
                "Started", "Source", "Week", "Status", "Records", "Error"
            );
            println!("{}", "-".repeat(90));
            for run in runs {
                println!(
                    "{:<22} {:<14} {:<12} {:<10} {:>8}  {}",
                    short_time(run["started_at"].as_str().unwrap_or("-")),
                    str_field(&run, "source"),
                    str_field(&run, "period_start"),
                    str_field(&run, "status"),
                    run["records_written"].as_u64().unwrap_or(0),
                    run["error"].as_str().unwrap_or(""),
                );
            }
        }

        Commands::Publish {
            week_start,
            week_end,
            dry_run,
        } => {
            let body = serde_json::json!({
                "week_start": week_start,
                "week_end": week_end,
                "dry_run": dry_run,
            });

            let response = client
                .post(format!("{}/api/v1/publish", cli.api_url))
                .json(&body)
                .send()
                .await;
            let result = expect_json(response, &cli.api_url).await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("{}", str_field(&result, "message"));
            println!();
            if dry_run {
                println!("(Dry run - nothing was posted)");
            } else {
                for target in result["delivered"].as_array().into_iter().flatten() {
                    println!("Posted to {}", target.as_str().unwrap_or("-"));
                }
                for failure in result["failed"].as_array().into_iter().flatten() {
                    println!(
                        "Failed {}: {}",
                        str_field(failure, "target"),
                        str_field(failure, "error")
                    );
                }
            }
        }

        Commands::Config { output } => {
            let config = tally::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Parse a successful JSON response or exit with the server's error
async fn expect_json(
    response: reqwest::Result<reqwest::Response>,
    api_url: &str,
) -> Result<Value, Box<dyn std::error::Error>> {
    match response {
        Ok(resp) if resp.status().is_success() => Ok(resp.json().await?),
        Ok(resp) => fail(resp).await,
        Err(e) => {
            eprintln!("Cannot connect to Tally API at {}", api_url);
            eprintln!("Error: {}", e);
            eprintln!();
            eprintln!("Make sure the Tally server is running:");
            eprintln!("  cargo run --bin tally");
            std::process::exit(1);
        }
    }
}

async fn fail(response: reqwest::Response) -> ! {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(text);
    eprintln!("Request failed ({}): {}", status, message);
    std::process::exit(1);
}

fn week_query(week_start: Option<String>, week_end: Option<String>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(start) = week_start {
        query.push(("week_start", start));
    }
    if let Some(end) = week_end {
        query.push(("week_end", end));
    }
    query
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("-")
}

/// "2024-01-08T09:00:01.123Z" -> "2024-01-08 09:00:01"
fn short_time(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{:.0}", v),
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

fn print_run_reports(result: &Value, dry_run: bool) {
    for report in result["reports"].as_array().into_iter().flatten() {
        let status = str_field(report, "status");
        let mut line = format!(
            "{:<14} {}..{}  {:<10}",
            str_field(report, "source"),
            str_field(report, "period_start"),
            str_field(report, "period_end"),
            status,
        );
        if status == "succeeded" {
            line.push_str(&format!(
                " {} written, {} skipped",
                report["records_written"].as_u64().unwrap_or(0),
                report["records_skipped"].as_u64().unwrap_or(0)
            ));
        } else if let Some(error) = report["error"].as_str() {
            line.push_str(&format!(" {}", error));
        }
        println!("{}", line);

        if dry_run {
            for row in report["preview"].as_array().into_iter().flatten() {
                println!(
                    "    {:<20} {:<28} {}",
                    str_field(row, "dimension"),
                    str_field(row, "metric_name"),
                    format_value(row["metric_value"].as_f64())
                );
            }
        }
    }

    println!();
    println!(
        "Succeeded: {}  Failed: {}  Skipped: {}",
        result["succeeded"].as_u64().unwrap_or(0),
        result["failed"].as_u64().unwrap_or(0),
        result["skipped"].as_u64().unwrap_or(0)
    );
    if dry_run {
        println!("(Dry run - nothing was written)");
    }
}

fn print_summaries(data: &Value) {
    let rows = data["summaries"].as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        println!("No summaries for the selected weeks");
        return;
    }

    println!(
        "{:<12} {:<14} {:<20} {:<28} {:>12}",
        "Week", "Source", "Dimension", "Metric", "Value"
    );
    println!("{}", "-".repeat(90));
    for row in rows {
        println!(
            "{:<12} {:<14} {:<20} {:<28} {:>12}",
            str_field(&row, "period_start"),
            str_field(&row, "source"),
            str_field(&row, "dimension"),
            str_field(&row, "metric_name"),
            format_value(row["metric_value"].as_f64())
        );
    }
}

fn print_dashboard(data: &Value) {
    println!(
        "Week {} .. {} (compared with {} .. {})",
        str_field(&data["period"], "start"),
        str_field(&data["period"], "end"),
        str_field(&data["prior_period"], "start"),
        str_field(&data["prior_period"], "end"),
    );

    for widget in data["widgets"].as_array().into_iter().flatten() {
        println!();
        println!("{} / {}", str_field(widget, "source"), str_field(widget, "dimension"));
        for metric in widget["metrics"].as_array().into_iter().flatten() {
            let yoy = metric["yoy_percent"]
                .as_f64()
                .map(|p| format!("{:+.1}%", p))
                .unwrap_or_default();
            println!(
                "  {:<28} {:>12} {:>12} {:>8}",
                str_field(metric, "metric_name"),
                format_value(metric["value"].as_f64()),
                format_value(metric["prior"].as_f64()),
                yoy
            );
        }
    }

    let missing: Vec<&str> = data["missing_sources"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if !missing.is_empty() {
        println!();
        println!("No data this week: {}", missing.join(", "));
    }
}

fn print_dashboard_csv(data: &Value) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["source", "dimension", "metric_name", "value", "prior", "yoy_percent"])?;

    for widget in data["widgets"].as_array().into_iter().flatten() {
        for metric in widget["metrics"].as_array().into_iter().flatten() {
            writer.write_record([
                str_field(widget, "source").to_string(),
                str_field(widget, "dimension").to_string(),
                str_field(metric, "metric_name").to_string(),
                metric["value"].as_f64().map(|v| v.to_string()).unwrap_or_default(),
                metric["prior"].as_f64().map(|v| v.to_string()).unwrap_or_default(),
                metric["yoy_percent"].as_f64().map(|v| format!("{:.1}", v)).unwrap_or_default(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}
