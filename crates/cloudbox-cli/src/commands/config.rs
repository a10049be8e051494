//! Config command implementation.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use cloudbox_core::config::Config;
use cloudbox_core::view::format_size;

use super::ConfigAction;

/// Run the config command.
pub fn run(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match get_config_value(&config, &key) {
                Some(value) => println!("{}: {}", key, value),
                None => bail!("Unknown configuration key: {}", key),
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            if !set_config_value(&mut config, &key, &value)? {
                bail!("Unknown configuration key: {}", key);
            }
            config.validate()?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }

        ConfigAction::Show => {
            let config = Config::load()?;
            println!();
            println!("Cloudbox Configuration");
            println!("{}", "─".repeat(50));
            println!();
            println!("[server]");
            println!("  base_url = \"{}\"", config.server.base_url);
            println!(
                "  request_timeout = \"{}\"",
                format_duration(config.server.request_timeout)
            );
            println!("  login_hint = \"{}\"", config.server.login_hint);
            println!();
            println!("[upload]");
            println!(
                "  max_file_size = {} ({})",
                config.upload.max_file_size,
                format_size(config.upload.max_file_size)
            );
            println!(
                "  max_concurrent_uploads = {}",
                config.upload.max_concurrent_uploads
            );
            println!(
                "  completion_display_delay = \"{}\"",
                format_duration(config.upload.completion_display_delay)
            );
            println!();
            println!("[ui]");
            println!("  confirm_delete = {}", config.ui.confirm_delete);
            println!("  relative_dates = {}", config.ui.relative_dates);
            println!();
        }

        ConfigAction::Path => println!("{}", Config::config_path().display()),

        ConfigAction::Reset => {
            Config::default().save()?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "server.base_url" => Some(config.server.base_url.clone()),
        "server.request_timeout" => Some(format_duration(config.server.request_timeout)),
        "server.login_hint" => Some(config.server.login_hint.clone()),
        "upload.max_file_size" => Some(config.upload.max_file_size.to_string()),
        "upload.max_concurrent_uploads" => Some(config.upload.max_concurrent_uploads.to_string()),
        "upload.completion_display_delay" => {
            Some(format_duration(config.upload.completion_display_delay))
        }
        "ui.confirm_delete" => Some(config.ui.confirm_delete.to_string()),
        "ui.relative_dates" => Some(config.ui.relative_dates.to_string()),
        _ => None,
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<bool> {
    let invalid = || format!("Invalid value for {key}: {value}");
    match key {
        "server.base_url" => config.server.base_url = value.trim_end_matches('/').to_string(),
        "server.request_timeout" => {
            config.server.request_timeout = parse_duration(value).with_context(invalid)?;
        }
        "server.login_hint" => config.server.login_hint = value.to_string(),
        "upload.max_file_size" => {
            config.upload.max_file_size = value.parse().with_context(invalid)?;
        }
        "upload.max_concurrent_uploads" => {
            config.upload.max_concurrent_uploads = value.parse().with_context(invalid)?;
        }
        "upload.completion_display_delay" => {
            config.upload.completion_display_delay =
                parse_duration(value).with_context(invalid)?;
        }
        "ui.confirm_delete" => config.ui.confirm_delete = value.parse().with_context(invalid)?,
        "ui.relative_dates" => config.ui.relative_dates = value.parse().with_context(invalid)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Accepts `250ms`, `30s` or a bare number of seconds.
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Some(millis) = value.strip_suffix("ms") {
        return Ok(Duration::from_millis(millis.trim().parse()?));
    }
    let secs = value.strip_suffix('s').unwrap_or(value);
    Ok(Duration::from_secs(secs.trim().parse()?))
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
