//! Share command implementation.

use anyhow::{Context, Result};

use cloudbox_core::api::FileId;
use cloudbox_core::dialogs::share::{
    self as share_dialog, normalize_share_code, unavailable_reason, ShareOptions,
};
use cloudbox_core::view::{format_size, format_timestamp};

use super::{open_session, ShareAction};
use crate::ui::{self, ShareBox};

/// Run the share command.
pub async fn run(action: ShareAction, server: Option<&str>) -> Result<()> {
    let (_, session) = open_session(server)?;
    let api = session.api();

    match action {
        ShareAction::Create {
            id,
            days,
            no_code,
            max_downloads,
            json,
        } => {
            let options = ShareOptions {
                expire_days: days,
                need_extract_code: !no_code,
                max_downloads,
            };
            let share = share_dialog::create_share(api, FileId(id), &options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&share)?);
                return Ok(());
            }

            println!();
            let mut share_box =
                ShareBox::new(&share.share_url).with_extract_code(share.extract_code.as_deref());
            if let Some(expire_at) = share.expire_at {
                share_box = share_box.with_expire(format_timestamp(expire_at));
            }
            share_box.display();
            if let Some(max) = share.max_downloads {
                println!("  Limited to {} download(s).", max);
            }
            println!();
        }

        ShareAction::Info { code } => {
            let code = normalize_share_code(&code)?;
            let info = api.share_info(&code).await?;

            println!();
            println!("  File:     {}", info.filename);
            println!("  Size:     {}", format_size(info.size));
            if let Some(expire_at) = info.expire_at {
                println!("  Expires:  {}", format_timestamp(expire_at));
            }
            if let Some(left) = info.downloads_remaining {
                println!("  Downloads left: {}", left);
            }
            if info.need_extract_code {
                println!("  An extract code is required.");
            }
            if let Some(reason) = unavailable_reason(&info) {
                println!("  Unavailable: {}", reason);
            }
            println!();
        }

        ShareAction::Get {
            code,
            extract_code,
            output,
        } => {
            let code = normalize_share_code(&code)?;
            let dest = match output {
                Some(dest) => dest,
                None => std::env::current_dir().context("Failed to determine current directory")?,
            };

            let info = api.share_info(&code).await?;
            let extract_code = match extract_code {
                Some(extract) => Some(extract),
                None if info.need_extract_code => Some(ui::prompt("Extract code")?),
                None => None,
            };

            let path =
                share_dialog::download_share(api, &code, extract_code.as_deref(), &dest).await?;
            println!("  Saved {}", path.display());
        }

        ShareAction::List { json } => {
            let shares = api.my_shares().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&shares)?);
                return Ok(());
            }

            if shares.is_empty() {
                println!("  No share links.");
                return Ok(());
            }

            println!();
            for share in &shares {
                let state = if share.is_active { "active" } else { "inactive" };
                let limit = share
                    .max_downloads
                    .map_or_else(|| "unlimited".to_string(), |m| m.to_string());
                let expire = share
                    .expire_at
                    .map_or_else(|| "-".to_string(), format_timestamp);
                println!(
                    "  {:<12} file {:<6} {:<8} {}/{} downloads  expires {}",
                    share.share_code, share.file_id, state, share.download_count, limit, expire
                );
            }
            println!();
        }

        ShareAction::Cancel { code } => {
            let code = normalize_share_code(&code)?;
            api.cancel_share(&code).await?;
            println!("  Share {} cancelled.", code);
        }
    }

    Ok(())
}
