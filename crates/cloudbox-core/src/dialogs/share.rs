//! Share link creation and the public share page.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::api::{ApiClient, CreateShareRequest, FileId, ShareCreated, ShareInfo};
use crate::error::{Error, Result};

/// Longest allowed share lifetime in days.
pub const MAX_EXPIRE_DAYS: u8 = 7;

/// Length of an extract code.
pub const EXTRACT_CODE_LEN: usize = 4;

/// Options of the share dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareOptions {
    /// Lifetime in days, `1..=7`
    pub expire_days: u8,
    /// Protect the link with an extract code
    pub need_extract_code: bool,
    /// Download limit; `None` is unlimited
    pub max_downloads: Option<u32>,
}

impl Default for ShareOptions {
    fn default() -> Self {
        Self {
            expire_days: MAX_EXPIRE_DAYS,
            need_extract_code: true,
            max_downloads: None,
        }
    }
}

impl ShareOptions {
    /// Check the options before anything is sent.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] naming the bad field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_EXPIRE_DAYS).contains(&self.expire_days) {
            return Err(Error::InvalidInput(format!(
                "expiry must be between 1 and {MAX_EXPIRE_DAYS} days"
            )));
        }
        if self.max_downloads == Some(0) {
            return Err(Error::InvalidInput(
                "download limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Request body for `file_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::validate`].
    pub fn request(&self, file_id: FileId) -> Result<CreateShareRequest> {
        self.validate()?;
        Ok(CreateShareRequest {
            file_id,
            expire_days: self.expire_days,
            need_extract_code: self.need_extract_code,
            max_downloads: self.max_downloads,
        })
    }
}

/// Validate and create a share link.
///
/// # Errors
///
/// Validation errors are returned without a request.
pub async fn create_share(
    api: &ApiClient,
    file_id: FileId,
    options: &ShareOptions,
) -> Result<ShareCreated> {
    let request = options.request(file_id)?;
    api.create_share(&request).await
}

/// Extract the share code from a `/share/<code>` link.
pub fn share_code_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/share/")?;
    let code: String = rest
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    (!code.is_empty()).then_some(code)
}

/// Accept either a bare share code or a full link.
pub fn normalize_share_code(input: &str) -> Result<String> {
    let input = input.trim();
    if let Some(code) = share_code_from_url(input) {
        return Ok(code);
    }
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Ok(input.to_string());
    }
    Err(Error::InvalidInput(format!("'{input}' is not a share code or link")))
}

/// Check a user-typed extract code.
///
/// # Errors
///
/// [`Error::InvalidInput`] if it is missing or not exactly four characters.
pub fn validate_extract_code(code: Option<&str>) -> Result<String> {
    let code = code.map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return Err(Error::InvalidInput("this share needs an extract code".into()));
    }
    if code.chars().count() != EXTRACT_CODE_LEN {
        return Err(Error::InvalidInput(format!(
            "extract code must be {EXTRACT_CODE_LEN} characters"
        )));
    }
    Ok(code.to_string())
}

/// Why a share cannot be downloaded, if it cannot.
pub fn unavailable_reason(info: &ShareInfo) -> Option<&'static str> {
    if info.is_expired {
        Some("this share has expired")
    } else if !info.is_active {
        Some("this share is no longer active")
    } else if info.downloads_remaining == Some(0) {
        Some("this share has reached its download limit")
    } else {
        None
    }
}

/// The public share page flow: look the share up, check the extract code,
/// then download into `dest`.
///
/// # Errors
///
/// [`Error::InvalidInput`] when the share is unusable or the extract code is
/// malformed; server errors otherwise.
pub async fn download_share(
    api: &ApiClient,
    share_code: &str,
    extract_code: Option<&str>,
    dest: &Path,
) -> Result<PathBuf> {
    let info = api.share_info(share_code).await?;
    if let Some(reason) = unavailable_reason(&info) {
        return Err(Error::InvalidInput(reason.into()));
    }

    let code = if info.need_extract_code {
        Some(validate_extract_code(extract_code)?)
    } else {
        None
    };

    api.access_share(share_code, code.as_deref()).await?;
    let path = api.download_shared(share_code, code.as_deref(), dest).await?;
    info!(share = %share_code, file = %info.filename, "shared file downloaded");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_bounds() {
        for days in 1..=7 {
            let options = ShareOptions {
                expire_days: days,
                ..ShareOptions::default()
            };
            assert!(options.validate().is_ok());
        }
        for days in [0, 8, 30] {
            let options = ShareOptions {
                expire_days: days,
                ..ShareOptions::default()
            };
            assert!(options.validate().is_err());
        }
    }

    #[test]
    fn test_request_carries_options() {
        let options = ShareOptions {
            expire_days: 3,
            need_extract_code: false,
            max_downloads: Some(5),
        };
        let request = options.request(FileId(11)).unwrap();
        assert_eq!(request.file_id, FileId(11));
        assert_eq!(request.expire_days, 3);
        assert!(!request.need_extract_code);
        assert_eq!(request.max_downloads, Some(5));
    }

    #[test]
    fn test_share_code_from_url() {
        assert_eq!(
            share_code_from_url("http://raspberrycloud.local/share/Ab12Cd34").as_deref(),
            Some("Ab12Cd34")
        );
        assert_eq!(
            share_code_from_url("https://x/share/Q9?extract_code=1234").as_deref(),
            Some("Q9")
        );
        assert_eq!(share_code_from_url("https://x/files/12"), None);
        assert_eq!(share_code_from_url("https://x/share/"), None);
    }

    #[test]
    fn test_normalize_share_code() {
        assert_eq!(normalize_share_code(" Ab12 ").unwrap(), "Ab12");
        assert_eq!(normalize_share_code("http://h/share/Zz9").unwrap(), "Zz9");
        assert!(normalize_share_code("not a code").is_err());
    }

    #[test]
    fn test_extract_code_rules() {
        assert_eq!(validate_extract_code(Some(" ab12 ")).unwrap(), "ab12");
        assert!(validate_extract_code(None).is_err());
        assert!(validate_extract_code(Some("   ")).is_err());
        assert!(validate_extract_code(Some("abc")).is_err());
        assert!(validate_extract_code(Some("abcde")).is_err());
    }

    #[test]
    fn test_unavailable_reason() {
        let mut info = ShareInfo {
            filename: "a".into(),
            size: 1,
            need_extract_code: false,
            expire_at: None,
            is_active: true,
            is_expired: false,
            downloads_remaining: Some(2),
        };
        assert_eq!(unavailable_reason(&info), None);

        info.downloads_remaining = Some(0);
        assert!(unavailable_reason(&info).unwrap().contains("limit"));

        info.is_expired = true;
        assert!(unavailable_reason(&info).unwrap().contains("expired"));
    }
}
