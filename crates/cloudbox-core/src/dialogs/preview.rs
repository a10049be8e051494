//! Preview support by file type.

use serde::Serialize;

use crate::api::{ApiClient, FileEntity};
use crate::error::Result;
use crate::view::extension;

/// How a file can be previewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    /// Inline picture
    Image,
    /// Video player
    Video,
    /// Audio player
    Audio,
    /// PDF or plain text
    Document,
}

impl PreviewKind {
    /// Preview kind for a file name, or `None` if it cannot be previewed.
    ///
    /// `.ogg` is treated as video, matching the web player.
    pub fn from_name(name: &str) -> Option<Self> {
        match extension(name).as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" => Some(Self::Image),
            "mp4" | "webm" | "ogg" => Some(Self::Video),
            "mp3" | "wav" | "m4a" => Some(Self::Audio),
            "pdf" | "txt" => Some(Self::Document),
            _ => None,
        }
    }
}

/// What the preview dialog shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    /// Player to use
    pub kind: PreviewKind,
    /// Absolute URL of the content
    pub url: String,
}

/// Preview of an entry, or `None` for folders and unsupported types.
///
/// # Errors
///
/// Returns an error only if the URL cannot be built.
pub fn preview(api: &ApiClient, entity: &FileEntity) -> Result<Option<Preview>> {
    if entity.is_folder {
        return Ok(None);
    }
    let Some(kind) = PreviewKind::from_name(entity.display_name()) else {
        return Ok(None);
    };
    let url = api.preview_url(entity.id)?;
    Ok(Some(Preview {
        kind,
        url: url.to_string(),
    }))
}
