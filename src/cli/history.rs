//! 历史命令：recent / failed / search / stats / export / prune / clear / info

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use dialoguer::Confirm;
use std::path::PathBuf;

use super::output::{format_entry, format_output, status_line};
use crate::notification::{ExportFormat, HistoryFilter, Notifier, NotificationLogEntry, Priority};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Show the most recent notifications
    Recent {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Show failed notifications
    Failed,
    /// Search titles and messages
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Statistics for the last N days
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Export to CSV or Markdown
    Export {
        /// csv or md
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        /// Output file (defaults to the exports directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Only entries on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Only entries on or before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Only failed entries
        #[arg(long)]
        failed: bool,
    },
    /// Delete entries older than N days
    Prune {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Delete all history
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Storage location and size
    Info,
}

pub fn handle_history(notifier: &Notifier, action: HistoryAction, json: bool) -> Result<bool> {
    let history = notifier.history();

    match action {
        HistoryAction::Recent { count } => print_entries(&history.recent(count), json),
        HistoryAction::Failed => print_entries(&history.failed(), json),
        HistoryAction::Search { query, limit } => print_entries(&history.search(&query, limit), json),
        HistoryAction::Stats { days } => {
            let stats = history.statistics(days);
            if json {
                println!("{}", format_output(&stats));
                return Ok(true);
            }
            println!("Last {} days", stats.period_days);
            println!("  Total:   {}", stats.total);
            println!("  Success: {} ({:.1}%)", stats.successful, stats.success_rate);
            println!("  Failed:  {}", stats.failed);
            if !stats.by_priority.is_empty() {
                println!("\nBy priority:");
                for (priority, count) in &stats.by_priority {
                    println!("  {:<8} {}", priority, count);
                }
            }
            if !stats.by_day.is_empty() {
                println!("\nBy day:");
                for (day, count) in &stats.by_day {
                    println!("  {} {}", day, count);
                }
            }
            if !stats.common_tags.is_empty() {
                println!("\nTop tags:");
                for (tag, count) in &stats.common_tags {
                    println!("  {:<20} {}", tag, count);
                }
            }
        }
        HistoryAction::Export {
            format,
            output,
            since,
            until,
            priority,
            failed,
        } => {
            let filter = HistoryFilter {
                since,
                until,
                priority,
                success: failed.then_some(false),
                ..Default::default()
            };
            let count = history.query(&filter).len();
            match history.export_to_file(format, &filter, output.as_deref(), &notifier.paths().exports)? {
                Some(path) => println!(
                    "{}",
                    status_line(true, &format!("Exported {} notifications to {}", count, path.display()))
                ),
                None => println!("No notifications match, nothing exported"),
            }
        }
        HistoryAction::Prune { days } => {
            let removed = history.prune_older_than(days)?;
            println!("{}", status_line(true, &format!("Removed {} entries older than {} days", removed, days)));
        }
        HistoryAction::Clear { yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete all history in {}?", history.path().display()))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Aborted.");
                    return Ok(true);
                }
            }
            history.clear()?;
            println!("{}", status_line(true, "History cleared"));
        }
        HistoryAction::Info => {
            let info = history.storage_info();
            if json {
                println!("{}", format_output(&info));
                return Ok(true);
            }
            println!("File:    {}", history.path().display());
            if info.corrupt {
                println!(
                    "{}",
                    status_line(false, "History file is corrupt: new notifications are not being recorded")
                );
                println!("  Fix the file by hand or run `ntfy history clear`");
            }
            println!("Entries: {}", info.count);
            println!("Size:    {:.2} KB", info.file_size_kb);
            if let (Some(oldest), Some(newest)) = (info.oldest, info.newest) {
                println!("Oldest:  {}", oldest.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
                println!("Newest:  {}", newest.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
            }
        }
    }
    Ok(true)
}

fn print_entries(entries: &[NotificationLogEntry], json: bool) {
    if json {
        println!("{}", format_output(&entries));
        return;
    }
    if entries.is_empty() {
        println!("No notifications found");
        return;
    }
    for entry in entries {
        println!("{}", format_entry(entry));
    }
}
