//! Single-purpose dialog controllers.
//!
//! Each controller validates its input locally, so a rejected form never
//! reaches the network, and then calls the [`ApiClient`].
//!
//! [`ApiClient`]: crate::api::ApiClient

pub mod preview;
pub mod share;

use tracing::info;

use crate::api::{ApiClient, FileId};
use crate::error::{Error, Result};
use crate::prefs::Preferences;
use crate::view::ViewMode;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// What a rename dialog did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The server renamed the entry
    Renamed,
    /// The name did not change; nothing was sent
    Unchanged,
}

/// Rename an entry.
///
/// # Errors
///
/// [`Error::EmptyName`] for a blank name, without a request.
pub async fn rename(
    api: &ApiClient,
    id: FileId,
    current_name: &str,
    new_name: &str,
) -> Result<RenameOutcome> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(Error::EmptyName);
    }
    if new_name == current_name {
        return Ok(RenameOutcome::Unchanged);
    }

    api.rename_file(id, new_name).await?;
    info!(file = %id, "renamed to {new_name}");
    Ok(RenameOutcome::Renamed)
}

/// Create a folder under `parent_id`.
///
/// # Errors
///
/// [`Error::EmptyName`] for a blank name, without a request.
pub async fn create_folder(api: &ApiClient, name: &str, parent_id: Option<FileId>) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    api.create_folder(name, parent_id).await?;
    info!(parent = ?parent_id, "created folder {name}");
    Ok(())
}

/// The password form of the settings dialog.
#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    /// Current password
    pub current: String,
    /// New password
    pub new: String,
    /// New password, typed again
    pub confirm: String,
}

impl PasswordChange {
    /// Check the form.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.current.is_empty() || self.new.is_empty() || self.confirm.is_empty() {
            return Err(Error::InvalidInput("all password fields are required".into()));
        }
        if self.new != self.confirm {
            return Err(Error::InvalidInput("new passwords do not match".into()));
        }
        if self.new.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Change the password, then end the session so the user logs in again.
///
/// # Errors
///
/// Validation errors are returned without a request.
pub async fn change_password(api: &ApiClient, form: &PasswordChange) -> Result<()> {
    form.validate()?;
    api.change_password(&form.current, &form.new).await?;
    api.logout().await?;
    info!("password changed; please log in again");
    Ok(())
}

/// Save the default view mode chosen in the settings dialog.
///
/// # Errors
///
/// Returns an error if the preferences cannot be written.
pub fn set_default_view(prefs: &mut Preferences, mode: ViewMode) -> Result<()> {
    prefs.set_view_mode(mode)
}
