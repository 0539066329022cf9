//! Output formatting utilities for CLI commands

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use custody_db::FileStatus;
use std::time::Duration;

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = new_table(headers);
    for row in rows {
        table.add_row(row);
    }
    println!("{}", table);
}

/// Print a table with custom column colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = new_table(headers);
    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| {
                let cell = Cell::new(text);
                match color {
                    Some(c) => cell.fg(c),
                    None => cell,
                }
            })
            .collect();
        table.add_row(cells);
    }
    println!("{}", table);
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);
    table
}

/// Display color for an ingestion status
pub fn status_color(status: FileStatus) -> Color {
    match status {
        FileStatus::Found => Color::Yellow,
        FileStatus::Uploading => Color::Cyan,
        FileStatus::Success => Color::Green,
        FileStatus::Error => Color::Red,
    }
}

/// Shorten a hex digest for table display
pub fn short_digest(digest: &str) -> String {
    if digest.len() > 12 {
        format!("{}…", &digest[..12])
    } else {
        digest.to_string()
    }
}

/// Format a timestamp relative to now, falling back to an absolute date
/// after a week.
pub fn format_time(time: DateTime<Utc>) -> String {
    match (Utc::now() - time).to_std() {
        Ok(ago) if ago.as_secs() < 604800 => format_duration_ago(ago),
        Ok(_) => time.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => "just now".to_string(),
    }
}

fn format_duration_ago(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{} second{} ago", secs, if secs == 1 { "" } else { "s" })
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if secs < 86400 {
        let hours = secs / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = secs / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
