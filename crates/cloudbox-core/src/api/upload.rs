//! Multipart upload transport.

use std::future::Future;
use std::io;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, StatusCode};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{error_message, ApiClient, UploadResponse};
use crate::error::{Error, Result};
use crate::upload::{ProgressReporter, SourceData, TransferRequest, Transport, UploadReceipt};

const MEMORY_CHUNK: usize = 64 * 1024;

impl ApiClient {
    async fn upload_file(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<UploadReceipt> {
        let transfer = async {
            let url = self.endpoint(&["files", "upload"])?;
            let form = multipart_form(request, progress).await?;
            let response = self
                .authorized(Method::POST, url)
                .await?
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                self.expire_session().await;
                return Err(Error::AuthExpired);
            }
            let body = response.text().await?;
            interpret_upload_response(status, &body)
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("upload aborted");
                Err(Error::Aborted)
            }
            result = transfer => result,
        }
    }
}

impl Transport for ApiClient {
    fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<UploadReceipt>> + Send {
        self.upload_file(request, progress, cancel)
    }
}

async fn multipart_form(request: TransferRequest, progress: ProgressReporter) -> Result<Form> {
    let source = request.source;
    let total = source.size();
    let body = match source.data() {
        SourceData::File(path) => {
            let file = tokio::fs::File::open(path).await?;
            Body::wrap_stream(counted(ReaderStream::new(file), total, progress))
        }
        SourceData::Memory(bytes) => {
            let bytes = Arc::clone(bytes);
            let len = bytes.len();
            let chunks = futures::stream::iter((0..len).step_by(MEMORY_CHUNK).map(move |start| {
                let end = (start + MEMORY_CHUNK).min(len);
                Ok::<_, io::Error>(bytes[start..end].to_vec())
            }));
            Body::wrap_stream(counted(chunks, total, progress))
        }
    };

    let part = Part::stream_with_length(body, total)
        .file_name(source.name().to_string())
        .mime_str(&source.mime_type())?;

    let mut form = Form::new().part("file", part);
    if let Some(parent) = request.parent_id {
        form = form.text("parent_id", parent.to_string());
    }
    Ok(form)
}

/// Reports every chunk as it is handed to the connection.
fn counted<S, B>(
    mut chunks: S,
    total: u64,
    progress: ProgressReporter,
) -> impl Stream<Item = io::Result<B>> + Send + 'static
where
    S: Stream<Item = io::Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::stream! {
        let mut sent = 0u64;
        while let Some(chunk) = chunks.next().await {
            if let Ok(bytes) = &chunk {
                sent += bytes.as_ref().len() as u64;
                progress.report(sent, Some(total));
            }
            yield chunk;
        }
    }
}

/// Turn the answer to `POST /files/upload` into a receipt or an error.
///
/// `401` is handled by the caller before this point.
pub(crate) fn interpret_upload_response(status: StatusCode, body: &str) -> Result<UploadReceipt> {
    if status != StatusCode::OK {
        let message = error_message(body)
            .unwrap_or_else(|| format!("upload failed ({})", status.as_u16()));
        return Err(Error::server(status.as_u16(), message));
    }

    let response: UploadResponse = serde_json::from_str(body)
        .map_err(|_| Error::MalformedResponse("failed to parse upload response".into()))?;
    if response.success {
        Ok(UploadReceipt {
            file: response.file,
        })
    } else {
        Err(Error::server(
            status.as_u16(),
            response.message.unwrap_or_else(|| "upload failed".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FileId;

    #[test]
    fn test_success_yields_receipt() {
        let body = r#"{"success": true, "file": {"id": 9, "filename": "a.txt", "size": 3}}"#;
        let receipt = interpret_upload_response(StatusCode::OK, body).unwrap();
        assert_eq!(receipt.file.unwrap().id, FileId(9));
    }

    #[test]
    fn test_refused_with_message() {
        let body = r#"{"success": false, "message": "存储空间不足"}"#;
        let err = interpret_upload_response(StatusCode::OK, body).unwrap_err();
        assert_eq!(err.to_string(), "存储空间不足");

        let err = interpret_upload_response(StatusCode::OK, r#"{"success": false}"#).unwrap_err();
        assert_eq!(err.to_string(), "upload failed");
    }

    #[test]
    fn test_unparsable_success_body() {
        let err = interpret_upload_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(
            matches!(err, Error::MalformedResponse(ref m) if m == "failed to parse upload response")
        );
    }

    #[test]
    fn test_http_failure_uses_detail() {
        let err = interpret_upload_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            r#"{"detail": "文件过大"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Server { status: 413, .. }));
        assert_eq!(err.to_string(), "文件过大");

        let err = interpret_upload_response(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert_eq!(err.to_string(), "upload failed (502)");
    }

    #[tokio::test]
    async fn test_counted_reports_running_total() {
        use std::sync::Mutex;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = ProgressReporter::new(move |sent, total| {
            sink.lock().unwrap().push((sent, total));
        });

        let chunks = futures::stream::iter(vec![
            Ok::<_, io::Error>(vec![0u8; 4]),
            Ok(vec![0u8; 6]),
        ]);
        let collected: Vec<_> = counted(chunks, 10, progress).collect().await;

        assert_eq!(collected.len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(4, Some(10)), (10, Some(10))]);
    }
}
