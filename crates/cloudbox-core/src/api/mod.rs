//! HTTP client for the Cloudbox storage API.
//!
//! [`ApiClient`] is the only component that talks to the server. It attaches
//! the bearer token, turns non-2xx answers into [`Error::Server`] carrying
//! the server's own message, and handles `401` globally: the credentials are
//! wiped, every [`ApiClient::subscribe_auth_expired`] receiver is notified
//! and the call fails with [`Error::AuthExpired`].
//!
//! Regular requests are bounded by `server.request_timeout`. Uploads and
//! downloads are not, since their duration depends on the file size.

pub mod types;
mod upload;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use types::*;

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::listing::ListQuery;

/// Authenticated client for one server.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    request_timeout: Duration,
    credentials: CredentialStore,
    auth_expired: watch::Sender<bool>,
}

impl ApiClient {
    /// Create a client for the server in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the base URL cannot be parsed.
    pub fn new(config: &ServerConfig, credentials: CredentialStore) -> Result<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            Error::InvalidConfig {
                key: "server.base_url".into(),
                reason: e.to_string(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig {
                key: "server.base_url".into(),
                reason: format!("'{base}' cannot carry a path"),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("cloudbox/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.request_timeout)
            .build()?;
        let (auth_expired, _) = watch::channel(false);

        Ok(Self {
            http,
            base,
            request_timeout: config.request_timeout,
            credentials,
            auth_expired,
        })
    }

    /// API root every endpoint is resolved against.
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// The credential store this client reads and clears.
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Flips to `true` whenever the server rejects the stored token, and back
    /// to `false` after the next successful login.
    pub fn subscribe_auth_expired(&self) -> watch::Receiver<bool> {
        self.auth_expired.subscribe()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig {
                key: "server.base_url".into(),
                reason: "cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self
            .credentials
            .token()
            .await
            .ok_or(Error::NotAuthenticated)?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, authenticated: bool) -> Result<Response> {
        let response = request.send().await?;
        self.check(response, authenticated).await
    }

    async fn check(&self, response: Response, authenticated: bool) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED && authenticated {
            self.expire_session().await;
            return Err(Error::AuthExpired);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body)
            .unwrap_or_else(|| format!("request failed ({})", status.as_u16()));
        debug!(status = status.as_u16(), "request rejected: {message}");
        Err(Error::server(status.as_u16(), message))
    }

    async fn expire_session(&self) {
        warn!("server rejected the stored credentials");
        if let Err(e) = self.credentials.clear().await {
            warn!("failed to clear credentials: {e}");
        }
        self.auth_expired.send_replace(true);
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request = self
            .authorized(Method::GET, url)
            .await?
            .timeout(self.request_timeout);
        decode(self.send(request, true).await?).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let request = self
            .authorized(Method::POST, url)
            .await?
            .json(body)
            .timeout(self.request_timeout);
        decode(self.send(request, true).await?).await
    }

    async fn form_ack(&self, method: Method, url: Url, form: &[(&str, String)]) -> Result<()> {
        let request = self
            .authorized(method, url)
            .await?
            .form(form)
            .timeout(self.request_timeout);
        ensure_ack(decode(self.send(request, true).await?).await?)
    }

    // ----- authentication -----

    /// Log in and store the token.
    ///
    /// With `remember` the token survives restarts. A wrong password is a
    /// plain [`Error::Server`], not a session expiry.
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<UserInfo> {
        let url = self.endpoint(&["auth", "login"])?;
        let request = self
            .http
            .post(url)
            .json(&LoginRequest { username, password })
            .timeout(self.request_timeout);
        let login: LoginResponse = decode(self.send(request, false).await?).await?;

        self.credentials
            .store(login.access_token, login.user_info.clone(), remember)
            .await?;
        self.auth_expired.send_replace(false);

        let user = match login.user_info {
            Some(user) => user,
            None => self.me().await?,
        };
        info!(user = %user.username, remember, "logged in");
        Ok(user)
    }

    /// Forget the stored token.
    pub async fn logout(&self) -> Result<()> {
        self.credentials.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Profile of the logged-in user; refreshes the cached copy.
    pub async fn me(&self) -> Result<UserInfo> {
        let user: UserInfo = self.get_json(self.endpoint(&["auth", "me"])?).await?;
        self.credentials.update_user(user.clone()).await?;
        Ok(user)
    }

    /// Change the account password. Callers decide what to do with the
    /// current session afterwards.
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let url = self.endpoint(&["auth", "change-password"])?;
        self.form_ack(
            Method::POST,
            url,
            &[
                ("old_password", old_password.to_string()),
                ("new_password", new_password.to_string()),
            ],
        )
        .await
    }

    // ----- files -----

    /// Used and total storage.
    pub async fn storage_info(&self) -> Result<StorageInfo> {
        self.get_json(self.endpoint(&["storage", "info"])?).await
    }

    /// Entries matching `query`, in server order.
    pub async fn list_files(&self, query: &ListQuery) -> Result<Vec<FileEntity>> {
        let request = self
            .authorized(Method::GET, self.endpoint(&["files", "list"])?)
            .await?
            .query(&query.query_pairs())
            .timeout(self.request_timeout);
        let list: ListResponse = decode(self.send(request, true).await?).await?;
        debug!(count = list.files.len(), "listed files");
        Ok(list.files)
    }

    /// Create a folder under `parent_id` (root when `None`).
    pub async fn create_folder(&self, name: &str, parent_id: Option<FileId>) -> Result<()> {
        let mut form = vec![("folder_name", name.to_string())];
        if let Some(parent) = parent_id {
            form.push(("parent_id", parent.to_string()));
        }
        self.form_ack(Method::POST, self.endpoint(&["files", "create-folder"])?, &form)
            .await
    }

    /// Delete a file or folder.
    pub async fn delete_file(&self, id: FileId) -> Result<()> {
        let request = self
            .authorized(Method::DELETE, self.endpoint(&["files", &id.to_string()])?)
            .await?
            .timeout(self.request_timeout);
        ensure_ack(decode(self.send(request, true).await?).await?)
    }

    /// Rename a file or folder.
    pub async fn rename_file(&self, id: FileId, new_name: &str) -> Result<()> {
        let url = self.endpoint(&["files", &id.to_string(), "rename"])?;
        self.form_ack(Method::PUT, url, &[("new_name", new_name.to_string())])
            .await
    }

    /// Download a file. When `dest` is a directory the server's file name is
    /// used inside it; otherwise `dest` is the target path.
    pub async fn download_file(&self, id: FileId, dest: &Path) -> Result<PathBuf> {
        let url = self.endpoint(&["files", "download", &id.to_string()])?;
        let request = self.authorized(Method::GET, url).await?;
        let response = self.send(request, true).await?;
        save_body(response, dest, &format!("file-{id}")).await
    }

    /// Download several files as one zip archive written to `dest`.
    pub async fn batch_download(&self, ids: &[FileId], dest: &Path) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct Body<'a> {
            file_ids: &'a [FileId],
        }

        let url = self.endpoint(&["files", "batch-download"])?;
        let request = self
            .authorized(Method::POST, url)
            .await?
            .json(&Body { file_ids: ids });
        let response = self.send(request, true).await?;
        save_body(response, dest, "batch_download.zip").await
    }

    /// Address of the inline preview of a file.
    pub fn preview_url(&self, id: FileId) -> Result<Url> {
        self.endpoint(&["files", "preview", &id.to_string()])
    }

    // ----- shares -----

    /// Create a share link.
    pub async fn create_share(&self, request: &CreateShareRequest) -> Result<ShareCreated> {
        let share: ShareCreated = self
            .post_json(self.endpoint(&["shares", "create"])?, request)
            .await?;
        info!(file = %request.file_id, code = %share.share_code, "share created");
        Ok(share)
    }

    /// The caller's share links.
    pub async fn my_shares(&self) -> Result<Vec<ShareRecord>> {
        let list: ShareList = self.get_json(self.endpoint(&["shares", "my-shares"])?).await?;
        Ok(list.shares)
    }

    /// Deactivate a share link.
    pub async fn cancel_share(&self, share_code: &str) -> Result<()> {
        let request = self
            .authorized(Method::DELETE, self.endpoint(&["shares", share_code])?)
            .await?
            .timeout(self.request_timeout);
        ensure_ack(decode(self.send(request, true).await?).await?)
    }

    /// Public information about a share link. Needs no login.
    pub async fn share_info(&self, share_code: &str) -> Result<ShareInfo> {
        let request = self
            .http
            .get(self.endpoint(&["shares", "info", share_code])?)
            .timeout(self.request_timeout);
        decode(self.send(request, false).await?).await
    }

    /// Check the extract code of a share link. Needs no login.
    pub async fn access_share(
        &self,
        share_code: &str,
        extract_code: Option<&str>,
    ) -> Result<ShareAccess> {
        let request = self
            .http
            .post(self.endpoint(&["shares", "access"])?)
            .json(&ShareAccessRequest {
                share_code,
                extract_code,
            })
            .timeout(self.request_timeout);
        let access: ShareAccess = decode(self.send(request, false).await?).await?;
        if access.success {
            Ok(access)
        } else {
            Err(Error::server(StatusCode::OK.as_u16(), "share access denied"))
        }
    }

    /// Direct download address of a share link.
    pub fn share_download_url(&self, share_code: &str, extract_code: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint(&["shares", "download", share_code])?;
        if let Some(code) = extract_code {
            url.query_pairs_mut().append_pair("extract_code", code);
        }
        Ok(url)
    }

    /// Download the file behind a share link. Needs no login.
    pub async fn download_shared(
        &self,
        share_code: &str,
        extract_code: Option<&str>,
        dest: &Path,
    ) -> Result<PathBuf> {
        let url = self.share_download_url(share_code, extract_code)?;
        let response = self.send(self.http.get(url), false).await?;
        save_body(response, dest, share_code).await
    }
}

/// Pull the human-readable message out of an error body.
///
/// Looks at `detail` first (a string, or the first `msg` of a validation
/// error list), then `message`.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let text = |v: &serde_json::Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_string);

    value
        .get("detail")
        .and_then(|detail| {
            text(detail).or_else(|| detail.as_array()?.first()?.get("msg").and_then(text))
        })
        .or_else(|| value.get("message").and_then(text))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| Error::MalformedResponse(e.to_string()))
}

fn ensure_ack(ack: Ack) -> Result<()> {
    if ack.success {
        Ok(())
    } else {
        Err(Error::server(
            StatusCode::OK.as_u16(),
            ack.message.unwrap_or_else(|| "request failed".into()),
        ))
    }
}

/// File name announced in a `Content-Disposition` header.
pub(crate) fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded.trim_matches('"');
            let value = encoded.split_once("''").map_or(encoded, |(_, v)| v);
            if let Some(decoded) = percent_decode(value) {
                return Some(decoded);
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }
    plain.filter(|name| !name.is_empty())
}

fn percent_decode(value: &str) -> Option<String> {
    let url = Url::parse(&format!("http://localhost/?v={}", value.replace('+', "%2B"))).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|name| !name.is_empty())
}

async fn save_body(response: Response, dest: &Path, fallback: &str) -> Result<PathBuf> {
    let target = if dest.is_dir() {
        let announced = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);
        // Only the last component; the header must not pick the directory.
        let name = announced
            .as_deref()
            .and_then(|n| Path::new(n).file_name())
            .map_or_else(|| fallback.to_string(), |n| n.to_string_lossy().into_owned());
        dest.join(name)
    } else {
        dest.to_path_buf()
    };

    let mut partial = target.clone().into_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    match write_stream(response, &partial).await {
        Ok(bytes) => {
            tokio::fs::rename(&partial, &target).await?;
            info!(path = %target.display(), bytes, "download complete");
            Ok(target)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn write_stream(response: Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut body = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        let config = ServerConfig {
            base_url: base_url.into(),
            ..ServerConfig::default()
        };
        ApiClient::new(&config, CredentialStore::in_memory()).expect("client")
    }

    #[test]
    fn test_error_message_prefers_detail() {
        assert_eq!(
            error_message(r#"{"detail": "文件名已存在", "message": "other"}"#).as_deref(),
            Some("文件名已存在")
        );
        assert_eq!(
            error_message(r#"{"message": "quota exceeded"}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            error_message(r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#)
                .as_deref(),
            Some("field required")
        );
    }

    #[test]
    fn test_error_message_absent() {
        assert_eq!(error_message("<html>Bad Gateway</html>"), None);
        assert_eq!(error_message(r#"{"detail": ""}"#), None);
        assert_eq!(error_message(r#"{"error": "x"}"#), None);
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let api = client("http://nas.local:8000/api/");
        let url = api.endpoint(&["files", "download", "42"]).unwrap();
        assert_eq!(url.as_str(), "http://nas.local:8000/api/files/download/42");
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let api = client("http://nas.local/api");
        let url = api.endpoint(&["shares", "info", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://nas.local/api/shares/info/a%2Fb");
    }

    #[test]
    fn test_share_download_url() {
        let api = client("http://nas.local/api");
        let url = api.share_download_url("Ab12Cd34", Some("x9z1")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://nas.local/api/shares/download/Ab12Cd34?extract_code=x9z1"
        );
        let url = api.share_download_url("Ab12Cd34", None).unwrap();
        assert!(url.query().is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ServerConfig {
            base_url: "not a url".into(),
            ..ServerConfig::default()
        };
        let err = ApiClient::new(&config, CredentialStore::in_memory()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_network() {
        // Nothing listens on this port; reaching the network would be a Network error.
        let api = client("http://127.0.0.1:9/api");
        let err = api.storage_info().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="report.pdf""#).as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            filename_from_disposition(
                "attachment; filename*=utf-8''%E6%8A%A5%E5%91%8A.pdf; filename=\"x.pdf\""
            )
            .as_deref(),
            Some("报告.pdf")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }
}
