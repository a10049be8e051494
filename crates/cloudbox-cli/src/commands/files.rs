//! File commands: ls, rm, rename, mkdir, download and preview.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use cloudbox_core::api::{FileEntity, FileId};
use cloudbox_core::dialogs::{self, preview::preview as preview_of, RenameOutcome};
use cloudbox_core::listing::ListQuery;
use cloudbox_core::session::Session;
use cloudbox_core::view::{format_relative, render, ViewMode};

use super::{open_session, DownloadArgs, LsArgs, MkdirArgs, PreviewArgs, RenameArgs, RmArgs};
use crate::ui;

const GRID_COLUMNS: usize = 4;

fn folder_query(parent: Option<i64>) -> ListQuery {
    ListQuery {
        parent_id: parent.map(FileId),
        ..ListQuery::default()
    }
}

/// Load `parent` and select `ids` in it. Unknown ids are an error.
async fn select_in(session: &mut Session, parent: Option<i64>, ids: &[i64]) -> Result<()> {
    session.navigate(folder_query(parent)).await?;

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| session.listing().get(FileId(**id)).is_none())
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        bail!(
            "Not found in {}: {}",
            session.query(),
            missing.join(", ")
        );
    }

    session
        .selection_mut()
        .select_all(ids.iter().copied().map(FileId));
    Ok(())
}

async fn find_entity(session: &mut Session, parent: Option<i64>, id: i64) -> Result<FileEntity> {
    session.navigate(folder_query(parent)).await?;
    session
        .listing()
        .get(FileId(id))
        .cloned()
        .ok_or_else(|| anyhow!("No entry with id {} in {}", id, session.query()))
}

/// Run the ls command.
pub async fn ls(args: LsArgs, server: Option<&str>) -> Result<()> {
    let (config, mut session) = open_session(server)?;

    let query = ListQuery {
        parent_id: args.folder.map(FileId),
        category: args.category.map(Into::into),
        search: args
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    };
    session.navigate(query).await?;

    let mode = args.view.unwrap_or_else(|| session.prefs().view_mode());
    let mut rows = render(&session.listing().entities, mode, session.selection());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if config.ui.relative_dates {
        let now = chrono::Utc::now().naive_utc();
        for (row, entity) in rows.iter_mut().zip(&session.listing().entities) {
            if let Some(ts) = entity.updated_at.or(entity.created_at) {
                row.modified_label = format_relative(ts, now);
            }
        }
    }

    println!();
    println!("  {}", session.query());
    println!();
    if rows.is_empty() {
        println!("  (empty)");
    } else {
        let lines = match mode {
            ViewMode::List => ui::list_lines(&rows),
            ViewMode::Grid => ui::grid_lines(&rows, GRID_COLUMNS),
        };
        for line in lines {
            println!("{}", line);
        }
    }
    println!();
    Ok(())
}

/// Run the rm command.
pub async fn rm(args: RmArgs, server: Option<&str>) -> Result<()> {
    let (config, mut session) = open_session(server)?;
    select_in(&mut session, args.parent, &args.ids).await?;

    if config.ui.confirm_delete && !args.yes {
        let question = format!("Delete {} item(s)?", session.selection().count());
        if !ui::confirm(&question)? {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let report = session.delete_selected().await?;
    for (id, error) in &report.failed {
        eprintln!("  Failed to delete {}: {}", id, error);
    }
    println!("  Delete finished: {}", report);

    if report.is_complete() {
        Ok(())
    } else {
        Err(anyhow!("{} item(s) could not be deleted", report.failed.len()))
    }
}

/// Run the rename command.
pub async fn rename(args: RenameArgs, server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    let entity = find_entity(&mut session, args.parent, args.id).await?;

    match dialogs::rename(session.api(), entity.id, entity.display_name(), &args.name).await? {
        RenameOutcome::Renamed => println!("  Renamed to {}", args.name.trim()),
        RenameOutcome::Unchanged => println!("  Name unchanged."),
    }
    Ok(())
}

/// Run the mkdir command.
pub async fn mkdir(args: MkdirArgs, server: Option<&str>) -> Result<()> {
    let (_, session) = open_session(server)?;
    dialogs::create_folder(session.api(), &args.name, args.parent.map(FileId)).await?;
    println!("  Created folder {}", args.name.trim());
    Ok(())
}

/// Run the download command.
pub async fn download(args: DownloadArgs, server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    select_in(&mut session, args.parent, &args.ids).await?;

    let dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let path: PathBuf = session.download_selected(&dir).await?;
    println!("  Saved {}", path.display());
    Ok(())
}

/// Run the preview command.
pub async fn preview(args: PreviewArgs, server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    let entity = find_entity(&mut session, args.parent, args.id).await?;

    let Some(preview) = preview_of(session.api(), &entity)? else {
        bail!("{} cannot be previewed", entity.display_name());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        println!("  {:?}: {}", preview.kind, preview.url);
    }
    Ok(())
}
