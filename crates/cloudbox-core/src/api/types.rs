//! Request and response bodies of the storage API.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Server-assigned identifier of a file or folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("'{s}' is not a file id")))
    }
}

/// Content category the server assigns to every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Pictures
    Image,
    /// Movies and clips
    Video,
    /// Music and recordings
    Audio,
    /// Text, PDF and office documents
    Document,
    /// Everything else
    Other,
}

impl Category {
    /// Wire name used in query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("unknown category '{other}'"))),
        }
    }
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntity {
    /// Identifier
    pub id: FileId,
    /// Stored name
    pub filename: String,
    /// Name the file was uploaded with
    #[serde(default)]
    pub original_filename: Option<String>,
    /// Size in bytes (0 for folders)
    #[serde(default)]
    pub size: u64,
    /// Server-side category; unknown values are kept as `None`
    #[serde(default, deserialize_with = "lenient_category")]
    pub category: Option<Category>,
    /// Whether this entry is a folder
    #[serde(default)]
    pub is_folder: bool,
    /// MIME type, if known
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Creation timestamp (UTC)
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    /// Last modification timestamp (UTC)
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

impl FileEntity {
    /// Name shown to the user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.original_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.filename)
    }
}

fn lenient_category<'de, D>(deserializer: D) -> Result<Option<Category>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Body of `GET /files/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    /// Entries in server order
    pub files: Vec<FileEntity>,
}

/// Body of a successful `POST /files/upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    /// Whether the server stored the file
    pub success: bool,
    /// Failure reason when `success` is false
    #[serde(default)]
    pub message: Option<String>,
    /// The stored file
    #[serde(default)]
    pub file: Option<UploadedFile>,
}

/// File record returned after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Identifier
    pub id: FileId,
    /// Stored name
    pub filename: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
}

/// Generic `{success, message}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    /// Whether the operation succeeded
    #[serde(default = "default_true")]
    pub success: bool,
    /// Optional server message
    #[serde(default)]
    pub message: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Account name
    pub username: &'a str,
    /// Password
    pub password: &'a str,
}

/// Successful login answer.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Bearer token
    pub access_token: String,
    /// Profile snapshot
    #[serde(default)]
    pub user_info: Option<UserInfo>,
}

/// The logged-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Account id
    #[serde(default)]
    pub id: i64,
    /// Account name
    pub username: String,
    /// Contact address
    #[serde(default)]
    pub email: Option<String>,
    /// Display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Administrator flag
    #[serde(default)]
    pub is_admin: bool,
    /// Storage quota in bytes
    #[serde(default)]
    pub quota: u64,
    /// Bytes in use
    #[serde(default)]
    pub used_space: u64,
}

/// Body of `GET /storage/info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Bytes in use
    #[serde(default)]
    pub used_storage: u64,
    /// Quota in bytes
    #[serde(default = "default_total_storage")]
    pub total_storage: u64,
}

const fn default_total_storage() -> u64 {
    100 * 1024 * 1024 * 1024
}

impl StorageInfo {
    /// Used share of the quota in percent, one decimal.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_storage == 0 {
            return 100.0;
        }
        let pct = self.used_storage as f64 / self.total_storage as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }
}

/// Body of `POST /shares/create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateShareRequest {
    /// File to share
    pub file_id: FileId,
    /// Lifetime in days
    pub expire_days: u8,
    /// Whether an extract code protects the link
    pub need_extract_code: bool,
    /// Download limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_downloads: Option<u32>,
}

/// A freshly created share link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareCreated {
    /// Public code
    pub share_code: String,
    /// Extract code, when one is required
    #[serde(default)]
    pub extract_code: Option<String>,
    /// Full link
    pub share_url: String,
    /// Expiry
    #[serde(default)]
    pub expire_at: Option<NaiveDateTime>,
    /// Download limit
    #[serde(default)]
    pub max_downloads: Option<u32>,
}

/// Public information about a share link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    /// Shared file name
    pub filename: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Whether an extract code is needed
    #[serde(default)]
    pub need_extract_code: bool,
    /// Expiry
    #[serde(default)]
    pub expire_at: Option<NaiveDateTime>,
    /// Link still usable
    #[serde(default)]
    pub is_active: bool,
    /// Link past its expiry
    #[serde(default)]
    pub is_expired: bool,
    /// Remaining downloads, `None` when unlimited
    #[serde(default)]
    pub downloads_remaining: Option<u32>,
}

impl ShareInfo {
    /// Whether a download can be attempted at all.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        self.is_active && !self.is_expired && self.downloads_remaining != Some(0)
    }
}

/// Body of `POST /shares/access`.
#[derive(Debug, Clone, Serialize)]
pub struct ShareAccessRequest<'a> {
    /// Public code
    pub share_code: &'a str,
    /// Extract code, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_code: Option<&'a str>,
}

/// Answer of `POST /shares/access`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareAccess {
    /// Whether access was granted
    #[serde(default = "default_true")]
    pub success: bool,
    /// The shared file
    #[serde(default)]
    pub file: Option<SharedFile>,
}

/// File behind a share link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    /// Identifier
    pub id: FileId,
    /// Name to save it as
    pub filename: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// MIME type, if known
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One of the caller's own shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    /// Public code
    pub share_code: String,
    /// Shared file
    pub file_id: FileId,
    /// Extract code
    #[serde(default)]
    pub extract_code: Option<String>,
    /// Expiry
    #[serde(default)]
    pub expire_at: Option<NaiveDateTime>,
    /// Download limit
    #[serde(default)]
    pub max_downloads: Option<u32>,
    /// Downloads so far
    #[serde(default)]
    pub download_count: u32,
    /// Still active
    #[serde(default)]
    pub is_active: bool,
}

/// Body of `GET /shares/my-shares`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareList {
    /// The caller's shares
    pub shares: Vec<ShareRecord>,
}
