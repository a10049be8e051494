//! View modes and the listing renderer.
//!
//! [`render`] is a pure function of the listing, the view mode and the
//! selection: calling it twice with the same inputs gives the same output,
//! and entries keep the order the server returned them in.

mod format;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use format::{format_relative, format_size, format_timestamp};

use crate::api::{Category, FileEntity, FileId};
use crate::error::Error;
use crate::selection::IsSelected;

/// How the listing is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// One row per entry
    #[default]
    List,
    /// Tiles with thumbnails
    Grid,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("list"),
            Self::Grid => f.write_str("grid"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(Self::List),
            "grid" => Ok(Self::Grid),
            other => Err(Error::InvalidInput(format!("unknown view mode '{other}'"))),
        }
    }
}

/// Icon shown next to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileIcon {
    /// Folder
    Folder,
    /// Picture
    Image,
    /// Movie
    Video,
    /// Sound
    Audio,
    /// PDF document
    Pdf,
    /// Compressed archive
    Archive,
    /// Source code
    Code,
    /// Text or office document
    Document,
    /// Anything else
    File,
}

impl FileIcon {
    /// Pick the icon for an entry: folders first, then the server category,
    /// then the extension.
    pub fn for_entity(entity: &FileEntity) -> Self {
        if entity.is_folder {
            return Self::Folder;
        }
        match Self::from_name(entity.display_name()) {
            Self::File => match entity.category {
                Some(Category::Image) => Self::Image,
                Some(Category::Video) => Self::Video,
                Some(Category::Audio) => Self::Audio,
                Some(Category::Document) => Self::Document,
                Some(Category::Other) | None => Self::File,
            },
            icon => icon,
        }
    }

    /// Icon by file extension alone.
    pub fn from_name(name: &str) -> Self {
        let ext = extension(name);
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" => Self::Image,
            "mp4" | "webm" | "mkv" | "avi" | "mov" => Self::Video,
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => Self::Audio,
            "pdf" => Self::Pdf,
            "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" => Self::Archive,
            "rs" | "py" | "js" | "ts" | "html" | "css" | "json" | "sh" | "c" | "cpp" | "go"
            | "java" => Self::Code,
            "txt" | "md" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "csv" => {
                Self::Document
            }
            _ => Self::File,
        }
    }

    /// Material symbol name used by the web client.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Image => "image",
            Self::Video => "video_library",
            Self::Audio => "music_note",
            Self::Pdf => "picture_as_pdf",
            Self::Archive => "folder_zip",
            Self::Code => "code",
            Self::Document | Self::File => "description",
        }
    }
}

/// Lower-cased extension without the dot, or empty.
pub(crate) fn extension(name: &str) -> String {
    name.rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Per-entry action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Save to disk
    Download,
    /// Create a share link
    Share,
    /// Rename
    Rename,
    /// Delete
    Delete,
}

const FILE_ACTIONS: &[Action] = &[Action::Download, Action::Share, Action::Rename, Action::Delete];
const FOLDER_ACTIONS: &[Action] = &[Action::Rename, Action::Delete];

/// Everything needed to draw one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderDescriptor {
    /// Entry id
    pub id: FileId,
    /// Display name
    pub name: String,
    /// Folder flag
    pub is_folder: bool,
    /// Icon
    pub icon: FileIcon,
    /// Size column (`-` or `Folder` for folders)
    pub size_label: String,
    /// Last modification, absolute
    pub modified_label: String,
    /// Checkbox state
    pub checked: bool,
    /// Thumbnail path relative to the API root (grid images only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Buttons offered for the entry
    pub actions: Vec<Action>,
}

/// Turn a listing into draw-ready descriptors.
pub fn render<S>(entities: &[FileEntity], mode: ViewMode, selection: &S) -> Vec<RenderDescriptor>
where
    S: IsSelected + ?Sized,
{
    entities
        .iter()
        .map(|entity| describe(entity, mode, selection.is_selected(entity.id)))
        .collect()
}

fn describe(entity: &FileEntity, mode: ViewMode, checked: bool) -> RenderDescriptor {
    let size_label = match (entity.is_folder, mode) {
        (true, ViewMode::List) => "-".to_string(),
        (true, ViewMode::Grid) => "Folder".to_string(),
        (false, _) => format_size(entity.size),
    };

    let modified_label = entity
        .updated_at
        .or(entity.created_at)
        .map_or_else(|| "-".to_string(), format_timestamp);

    let thumbnail_url = (mode == ViewMode::Grid
        && !entity.is_folder
        && entity.category == Some(Category::Image))
    .then(|| format!("/files/preview/{}", entity.id));

    let actions = if entity.is_folder {
        FOLDER_ACTIONS
    } else {
        FILE_ACTIONS
    };

    RenderDescriptor {
        id: entity.id,
        name: entity.display_name().to_string(),
        is_folder: entity.is_folder,
        icon: FileIcon::for_entity(entity),
        size_label,
        modified_label,
        checked,
        thumbnail_url,
        actions: actions.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn entity(id: i64, name: &str, is_folder: bool, category: Option<Category>) -> FileEntity {
        FileEntity {
            id: FileId(id),
            filename: name.into(),
            original_filename: None,
            size: if is_folder { 0 } else { 2048 },
            category,
            is_folder,
            mime_type: None,
            created_at: None,
            updated_at: chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                .and_then(|d| d.and_hms_opt(3, 4, 5)),
        }
    }

    fn listing() -> Vec<FileEntity> {
        vec![
            entity(3, "Photos", true, None),
            entity(1, "beach.jpg", false, Some(Category::Image)),
            entity(2, "notes.txt", false, Some(Category::Document)),
        ]
    }

    #[test]
    fn test_render_is_idempotent_and_ordered() {
        let selected: HashSet<FileId> = [FileId(1)].into_iter().collect();
        let first = render(&listing(), ViewMode::Grid, &selected);
        let second = render(&listing(), ViewMode::Grid, &selected);

        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![FileId(3), FileId(1), FileId(2)]);
    }

    #[test]
    fn test_checkbox_reflects_selection() {
        let selected = [FileId(2)];
        let rows = render(&listing(), ViewMode::List, &selected[..]);
        let checked: Vec<_> = rows.iter().map(|d| d.checked).collect();
        assert_eq!(checked, vec![false, false, true]);
    }

    #[test]
    fn test_folder_labels_depend_on_mode() {
        let none: HashSet<FileId> = HashSet::new();
        let list = render(&listing(), ViewMode::List, &none);
        let grid = render(&listing(), ViewMode::Grid, &none);

        assert_eq!(list[0].size_label, "-");
        assert_eq!(grid[0].size_label, "Folder");
        assert_eq!(list[1].size_label, "2 KB");
        assert_eq!(list[0].actions, vec![Action::Rename, Action::Delete]);
        assert_eq!(list[1].actions.len(), 4);
        assert_eq!(list[1].modified_label, "2024-01-02 03:04");
    }

    #[test]
    fn test_thumbnails_only_for_grid_images() {
        let none: HashSet<FileId> = HashSet::new();
        let grid = render(&listing(), ViewMode::Grid, &none);
        assert_eq!(grid[1].thumbnail_url.as_deref(), Some("/files/preview/1"));
        assert!(grid[2].thumbnail_url.is_none());

        let list = render(&listing(), ViewMode::List, &none);
        assert!(list.iter().all(|d| d.thumbnail_url.is_none()));
    }

    #[test]
    fn test_icons() {
        assert_eq!(FileIcon::from_name("Report.PDF"), FileIcon::Pdf);
        assert_eq!(FileIcon::from_name("backup.tar.gz"), FileIcon::Archive);
        assert_eq!(FileIcon::from_name("main.rs"), FileIcon::Code);
        assert_eq!(FileIcon::from_name(".bashrc"), FileIcon::File);
        assert_eq!(FileIcon::for_entity(&listing()[0]), FileIcon::Folder);

        let mut untyped = entity(9, "clip", false, Some(Category::Video));
        assert_eq!(FileIcon::for_entity(&untyped), FileIcon::Video);
        untyped.category = None;
        assert_eq!(FileIcon::for_entity(&untyped), FileIcon::File);
    }

    #[test]
    fn test_view_mode_parse() {
        assert_eq!("Grid".parse::<ViewMode>().unwrap(), ViewMode::Grid);
        assert!("table".parse::<ViewMode>().is_err());
        assert_eq!(ViewMode::default(), ViewMode::List);
    }
}
