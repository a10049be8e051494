//! View mode and theme preferences.

use anyhow::{Context, Result};

use cloudbox_core::dialogs;
use cloudbox_core::prefs::{Preferences, Theme};
use cloudbox_core::view::ViewMode;

fn load() -> Result<Preferences> {
    Preferences::load().context("Failed to load preferences")
}

/// Run the view command.
pub fn view(mode: Option<ViewMode>) -> Result<()> {
    let mut prefs = load()?;
    match mode {
        Some(mode) => {
            dialogs::set_default_view(&mut prefs, mode)?;
            println!("  Default view set to {}", mode);
        }
        None => println!("  {}", prefs.view_mode()),
    }
    Ok(())
}

/// Run the theme command.
pub fn theme(theme: Option<Theme>, toggle: bool) -> Result<()> {
    let mut prefs = load()?;
    let next = if toggle {
        Some(prefs.theme().toggled())
    } else {
        theme
    };

    match next {
        Some(theme) => {
            prefs.set_theme(theme)?;
            println!("  Theme set to {}", theme);
        }
        None => println!("  {}", prefs.theme()),
    }
    Ok(())
}
