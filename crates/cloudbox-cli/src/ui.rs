//! UI utilities for Cloudbox CLI.

use std::io::{self, BufRead, Write};

use cloudbox_core::api::StorageInfo;
use cloudbox_core::upload::{QueueSnapshot, UploadStatus};
use cloudbox_core::view::{format_size, FileIcon, RenderDescriptor};

const BOX_WIDTH: usize = 41;
const QUOTA_BAR_WIDTH: usize = 30;
const GRID_CELL: usize = 24;

/// A formatted box for displaying a new share link.
pub struct ShareBox<'a> {
    url: &'a str,
    extract_code: Option<&'a str>,
    expire: Option<String>,
}

impl<'a> ShareBox<'a> {
    /// Create a new share box.
    #[must_use]
    pub const fn new(url: &'a str) -> Self {
        Self {
            url,
            extract_code: None,
            expire: None,
        }
    }

    /// Add the extract code to the box.
    #[must_use]
    pub const fn with_extract_code(mut self, code: Option<&'a str>) -> Self {
        self.extract_code = code;
        self
    }

    /// Add expiration time to the box.
    #[must_use]
    pub fn with_expire(mut self, expire: impl Into<String>) -> Self {
        self.expire = Some(expire.into());
        self
    }

    /// Display the share box to stdout.
    pub fn display(&self) {
        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(self.url, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));

        if let Some(code) = self.extract_code {
            let code_line = format!("Extract code:  {}", format_code_spaced(code));
            println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        if let Some(expire) = &self.expire {
            let expire_line = format!("Expires {}", expire);
            println!("  │{}│", center_in_box(&expire_line, BOX_WIDTH));
            println!("  │{}│", " ".repeat(BOX_WIDTH));
        }

        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn format_code_spaced(code: &str) -> String {
    code.chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Short tag printed in front of an entry.
pub const fn icon_tag(icon: FileIcon) -> &'static str {
    match icon {
        FileIcon::Folder => "[dir]",
        FileIcon::Image => "[img]",
        FileIcon::Video => "[vid]",
        FileIcon::Audio => "[aud]",
        FileIcon::Pdf => "[pdf]",
        FileIcon::Archive => "[zip]",
        FileIcon::Code => "[src]",
        FileIcon::Document => "[doc]",
        FileIcon::File => "[file]",
    }
}

/// One line per entry: id, tag, name, size and date.
pub fn list_lines(rows: &[RenderDescriptor]) -> Vec<String> {
    let name_width = rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(4, 48);

    rows.iter()
        .map(|r| {
            format!(
                "  {:>6}  {:<6} {:<name_width$}  {:>10}  {}",
                r.id,
                icon_tag(r.icon),
                truncate(&r.name, name_width),
                r.size_label,
                r.modified_label,
            )
        })
        .collect()
}

/// Entries laid out in `columns` fixed-width cells.
pub fn grid_lines(rows: &[RenderDescriptor], columns: usize) -> Vec<String> {
    rows.chunks(columns.max(1))
        .map(|chunk| {
            let cells: Vec<String> = chunk
                .iter()
                .map(|r| {
                    let cell = format!("{} {}", icon_tag(r.icon), r.name);
                    format!("{:<GRID_CELL$}", truncate(&cell, GRID_CELL - 2))
                })
                .collect();
            format!("  {}", cells.join("").trim_end())
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Aggregate progress of the queue, e.g. `[ 42.50%] 2 uploading, 3 waiting`.
pub fn progress_line(snapshot: &QueueSnapshot) -> String {
    let active: Vec<f64> = snapshot
        .tasks
        .iter()
        .filter(|t| matches!(t.status, UploadStatus::Pending | UploadStatus::Uploading))
        .map(|t| t.progress)
        .collect();
    let pct = if active.is_empty() {
        100.0
    } else {
        active.iter().sum::<f64>() / active.len() as f64
    };
    format!(
        "[{:>6.2}%] {} uploading, {} waiting",
        pct, snapshot.uploading, snapshot.pending
    )
}

/// Storage usage with a bar, e.g. `[###.......] 1.5 GB of 100 GB (1.5%)`.
pub fn quota_line(info: &StorageInfo) -> String {
    let pct = info.percentage();
    let filled = ((pct / 100.0) * QUOTA_BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(QUOTA_BAR_WIDTH);
    format!(
        "[{}{}] {} of {} ({}%)",
        "#".repeat(filled),
        ".".repeat(QUOTA_BAR_WIDTH - filled),
        format_size(info.used_storage),
        format_size(info.total_storage),
        pct
    )
}

/// Ask for a line of input on stdin.
pub fn prompt(label: &str) -> io::Result<String> {
    print!("  {}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask a yes/no question; anything but `y`/`yes` is no.
pub fn confirm(question: &str) -> io::Result<bool> {
    let answer = prompt(&format!("{} [y/N]", question))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
