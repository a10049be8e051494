//! Upload command implementation.
//!
//! Files go through the session's upload queue: at most the configured
//! number transfer at once and the rest wait their turn. Ctrl-C cancels
//! everything that has not finished.

use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::{anyhow, Result};
use tokio::sync::broadcast::error::RecvError;

use cloudbox_core::api::FileId;
use cloudbox_core::upload::{TaskId, UploadEvent, UploadSource};

use super::{open_session, UploadArgs};
use crate::ui;

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl Tally {
    const fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Run the upload command.
#[allow(clippy::too_many_lines)]
pub async fn run(args: UploadArgs, server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    let uploads = session.uploads().clone();

    let mut sources = Vec::with_capacity(args.paths.len());
    let mut skipped = 0usize;
    for path in &args.paths {
        match UploadSource::from_path(path).await {
            Ok(source) => sources.push(source),
            Err(e) => {
                eprintln!("  Skipping {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }

    let mut events = uploads.events();
    let report = uploads
        .enqueue_many(sources, args.parent.map(FileId))
        .await;
    for (name, error) in &report.rejected {
        eprintln!("  Skipping {}: {}", name, error);
    }
    skipped += report.rejected.len();

    if report.queued.is_empty() {
        return Err(anyhow!("Nothing to upload"));
    }

    if !args.quiet {
        println!();
        println!("  Uploading {} file(s)", report.queued.len());
        println!();
    }

    let expected = report.queued.len();
    let mut names: HashMap<TaskId, String> = HashMap::new();
    let mut tally = Tally::default();
    let mut snapshots = uploads.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut lagged = false;

    while tally.total() < expected && !(lagged && snapshots.borrow().is_idle()) {
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if result.is_ok() {
                    if !args.quiet {
                        println!();
                        println!("  Cancelling...");
                    }
                    uploads.cancel_all().await?;
                }
            }
            event = events.recv() => match event {
                Ok(event) => report_event(&event, &mut names, &mut tally, args.quiet),
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("missed {} upload events", n);
                    lagged = true;
                }
                Err(RecvError::Closed) => break,
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                if !args.quiet {
                    print!("\r  {}    ", ui::progress_line(&snapshots.borrow_and_update()));
                    let _ = io::stdout().flush();
                }
            }
        }
    }

    if !args.quiet {
        println!();
        println!();
        println!(
            "  {} uploaded, {} failed, {} cancelled, {} skipped",
            tally.succeeded, tally.failed, tally.cancelled, skipped
        );
    }

    if tally.succeeded > 0 {
        session.sync().await?;
        if let Some(quota) = session.quota() {
            if !args.quiet {
                println!("  {}", ui::quota_line(quota));
            }
        }
    }
    if !args.quiet {
        println!();
    }

    if tally.failed > 0 || interrupted {
        Err(anyhow!(
            "{} upload(s) did not complete",
            tally.failed + tally.cancelled
        ))
    } else {
        Ok(())
    }
}

fn report_event(
    event: &UploadEvent,
    names: &mut HashMap<TaskId, String>,
    tally: &mut Tally,
    quiet: bool,
) {
    match event {
        UploadEvent::Queued { id, name } => {
            names.insert(*id, name.clone());
        }
        UploadEvent::Succeeded { id, .. } => {
            tally.succeeded += 1;
            if !quiet {
                println!("\r  done       {}", label(names, *id));
            }
        }
        UploadEvent::Failed { id, reason } => {
            tally.failed += 1;
            eprintln!("\r  failed     {}: {}", label(names, *id), reason);
        }
        UploadEvent::Cancelled { id } => {
            tally.cancelled += 1;
            if !quiet {
                println!("\r  cancelled  {}", label(names, *id));
            }
        }
        UploadEvent::Started { .. } | UploadEvent::Progress { .. } | UploadEvent::Removed { .. } => {}
    }
}

fn label(names: &HashMap<TaskId, String>, id: TaskId) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}
