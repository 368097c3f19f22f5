//! Firebase Storage REST connector
//!
//! Implements the `ObjectStore` trait for the Firebase Storage v0 REST API.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{
    ObjectEntry, ObjectHandle, ObjectStore, ProgressSender, TransferProgress,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::FirebaseStorageError;
use crate::types::{ListResponse, ObjectMetadata};

/// Firebase Storage API base URL
const STORAGE_API_BASE: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Timeout for metadata, list and delete requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for media uploads
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Firebase Storage connector
///
/// Requests carry the signed-in user's Firebase ID token; the bucket's
/// security rules decide what that user may touch.
///
/// # Example
///
/// ```ignore
/// use provider_firebase_storage::FirebaseStorageConnector;
///
/// let store = FirebaseStorageConnector::new(http_client, "demo.appspot.com", id_token);
/// let entries = store.list_objects("uploads/uid-1/").await?;
/// ```
pub struct FirebaseStorageConnector {
    http_client: Arc<dyn HttpClient>,
    bucket: String,
    id_token: String,
    retry_policy: RetryPolicy,
}

impl FirebaseStorageConnector {
    /// Create a new connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `bucket` - Storage bucket, e.g. `my-app.appspot.com`
    /// * `id_token` - Firebase ID token of the signed-in user
    ///
    /// Every request is sent once; see
    /// [`with_retry_policy`](Self::with_retry_policy) to retry reads.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        bucket: impl Into<String>,
        id_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            bucket: bucket.into(),
            id_token: id_token.into(),
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    /// Opt in to retrying idempotent requests (list, metadata) under
    /// `policy`. Uploads and deletes are never retried.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Swap in a refreshed ID token
    pub fn set_id_token(&mut self, id_token: impl Into<String>) {
        self.id_token = id_token.into();
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn objects_url(&self) -> String {
        format!("{}/{}/o", STORAGE_API_BASE, self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.objects_url(), urlencoding::encode(key))
    }

    fn media_url(&self, key: &str, token: &str) -> String {
        format!(
            "{}?alt=media&token={}",
            self.object_url(key),
            urlencoding::encode(token)
        )
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(self.id_token.as_str())
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    /// Turn a non-2xx response into a typed error
    fn check(
        response: HttpResponse,
        key: &str,
    ) -> std::result::Result<HttpResponse, FirebaseStorageError> {
        if response.is_success() {
            return Ok(response);
        }
        warn!(status = response.status, "Firebase Storage request failed");
        Err(FirebaseStorageError::from_status(
            response.status,
            key,
            response.text_lossy(),
        ))
    }

    fn parse<T: serde::de::DeserializeOwned>(
        response: &HttpResponse,
    ) -> std::result::Result<T, FirebaseStorageError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| FirebaseStorageError::ParseError(e.to_string()))
    }

    async fn fetch_metadata(
        &self,
        key: &str,
    ) -> std::result::Result<ObjectMetadata, FirebaseStorageError> {
        let request = self.request(HttpMethod::Get, self.object_url(key));
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;
        let response = Self::check(response, key)?;
        Self::parse(&response)
    }

    fn to_entry(prefix: &str, full_name: String, size: Option<u64>) -> Option<ObjectEntry> {
        let name = full_name.strip_prefix(prefix)?.to_string();
        if name.is_empty() || name.contains('/') {
            return None;
        }
        Some(ObjectEntry {
            name,
            handle: ObjectHandle::new(full_name),
            size,
        })
    }
}

#[async_trait]
impl ObjectStore for FirebaseStorageConnector {
    #[instrument(skip(self, data, progress), fields(size = data.len()))]
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        progress: ProgressSender,
    ) -> Result<ObjectHandle> {
        let total = data.len() as u64;
        let url = format!(
            "{}?uploadType=media&name={}",
            self.objects_url(),
            urlencoding::encode(key)
        );

        let request = HttpRequest::new(HttpMethod::Post, url)
            .bearer_token(self.id_token.as_str())
            .header(
                "Content-Type",
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(data)
            .timeout(UPLOAD_TIMEOUT);

        let _ = progress.send(TransferProgress::new(0, total));
        let response = self.http_client.execute(request).await?;
        let response = Self::check(response, key)?;
        let metadata: ObjectMetadata = Self::parse(&response)?;
        let _ = progress.send(TransferProgress::new(total, total));

        info!("Uploaded object to Firebase Storage");
        let handle = ObjectHandle::new(key);
        Ok(match metadata.first_download_token() {
            Some(token) => handle.with_download_token(token),
            None => handle,
        })
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, key: &str) -> Result<()> {
        let request = self.request(HttpMethod::Delete, self.object_url(key));
        let response = self.http_client.execute(request).await?;
        Self::check(response, key)?;
        debug!("Deleted object from Firebase Storage");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?prefix={}&delimiter=%2F",
                self.objects_url(),
                urlencoding::encode(&prefix)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let request = self.request(HttpMethod::Get, url);
            let response = self
                .http_client
                .execute_with_retry(request, self.retry_policy.clone())
                .await?;
            let response = Self::check(response, &prefix)?;
            let page: ListResponse = Self::parse(&response)?;

            entries.extend(page.items.into_iter().filter_map(|item| {
                let size = item.size.as_deref().and_then(|s| s.parse().ok());
                Self::to_entry(&prefix, item.name, size)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = entries.len(), "Listed objects");
        Ok(entries)
    }

    async fn resolve_download_url(&self, handle: &ObjectHandle) -> Result<String> {
        if let Some(token) = &handle.download_token {
            return Ok(self.media_url(&handle.key, token));
        }

        let metadata = self.fetch_metadata(&handle.key).await?;
        let token = metadata.first_download_token().ok_or_else(|| {
            FirebaseStorageError::MissingDownloadToken {
                object: handle.key.clone(),
            }
        })?;
        Ok(self.media_url(&handle.key, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const BUCKET: &str = "demo.appspot.com";

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn connector(mock_http: MockHttpClient) -> FirebaseStorageConnector {
        FirebaseStorageConnector::new(Arc::new(mock_http), BUCKET, "id-token")
    }

    /// Always answers 503 and honours the retry policy like the desktop client
    #[derive(Default)]
    struct UnavailableHttp {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpClient for UnavailableHttp {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(response(503, "unavailable"))
        }

        async fn execute_with_retry(
            &self,
            request: HttpRequest,
            policy: RetryPolicy,
        ) -> Result<HttpResponse> {
            let max_attempts = policy.max_attempts.max(1);
            let mut attempt = 0;
            loop {
                attempt += 1;
                let response = self.execute(request.clone()).await?;
                if !response.is_retryable() || attempt >= max_attempts {
                    return Ok(response);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_list_objects_sends_once_by_default() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(503, "unavailable")));

        let result = connector(mock_http).list_objects("uploads/uid-1/").await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));

        let http = Arc::new(UnavailableHttp::default());
        let store = FirebaseStorageConnector::new(http.clone(), BUCKET, "id-token");
        assert!(store.list_objects("uploads/uid-1/").await.is_err());
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_objects_retries_when_opted_in() {
        let http = Arc::new(UnavailableHttp::default());
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::no_retry()
        };
        let store = FirebaseStorageConnector::new(http.clone(), BUCKET, "id-token")
            .with_retry_policy(policy);

        assert!(store.list_objects("uploads/uid-1/").await.is_err());
        assert_eq!(http.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_put_object_uploads_media_and_keeps_token() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Post
                    && req.url.ends_with("/o?uploadType=media&name=uploads%2Fuid-1%2Fcat.png")
                    && req.headers.get("Content-Type").map(String::as_str) == Some("image/png")
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer id-token")
                    && req.body.as_deref() == Some(&b"png-bytes"[..])
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"name": "uploads/uid-1/cat.png", "size": "9", "downloadTokens": "tok-1"}"#,
                ))
            });

        let store = connector(mock_http);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = store
            .put_object(
                "uploads/uid-1/cat.png",
                Bytes::from_static(b"png-bytes"),
                Some("image/png"),
                tx,
            )
            .await
            .unwrap();

        assert_eq!(handle.key, "uploads/uid-1/cat.png");
        assert_eq!(handle.download_token.as_deref(), Some("tok-1"));

        let mut ticks = Vec::new();
        while let Some(tick) = rx.recv().await {
            ticks.push(tick);
        }
        assert_eq!(ticks, vec![TransferProgress::new(0, 9), TransferProgress::new(9, 9)]);
    }

    #[tokio::test]
    async fn test_put_object_rejected_by_rules() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(403, "denied")));

        let store = connector(mock_http);
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = store
            .put_object("uploads/uid-1/a.pdf", Bytes::from_static(b"x"), None, tx)
            .await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(msg)) if msg.contains("Permission denied")));
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Delete && req.url.ends_with("/o/uploads%2Fuid-1%2Fgone.png")
            })
            .times(1)
            .returning(|_| Ok(response(404, "")));

        let store = connector(mock_http);
        let result = store.delete_object("uploads/uid-1/gone.png").await;

        assert!(matches!(result, Err(BridgeError::NotFound(key)) if key == "uploads/uid-1/gone.png"));
    }

    #[tokio::test]
    async fn test_list_objects_follows_pages() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .withf(|req| !req.url.contains("pageToken"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{
                        "prefixes": ["uploads/uid-1/nested/"],
                        "items": [{"name": "uploads/uid-1/b.pdf", "bucket": "demo.appspot.com"}],
                        "nextPageToken": "page-2"
                    }"#,
                ))
            });
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("&pageToken=page-2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"items": [{"name": "uploads/uid-1/a.png", "size": "12"}]}"#,
                ))
            });

        let store = connector(mock_http);
        let entries = store.list_objects("uploads/uid-1/").await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
        assert_eq!(entries[0].size, Some(12));
        assert_eq!(entries[1].handle.key, "uploads/uid-1/b.pdf");
    }

    #[tokio::test]
    async fn test_resolve_url_with_known_token_skips_metadata() {
        let store = connector(MockHttpClient::new());
        let handle = ObjectHandle::new("uploads/uid-1/cat.png").with_download_token("tok-1");

        let url = store.resolve_download_url(&handle).await.unwrap();
        assert_eq!(
            url,
            "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/uploads%2Fuid-1%2Fcat.png?alt=media&token=tok-1"
        );
    }

    #[tokio::test]
    async fn test_resolve_url_fetches_metadata() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| req.method == HttpMethod::Get && req.url.ends_with("/o/uploads%2Fuid-1%2Fa.pdf"))
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"name": "uploads/uid-1/a.pdf", "downloadTokens": "tok-9"}"#,
                ))
            });

        let store = connector(mock_http);
        let url = store
            .resolve_download_url(&ObjectHandle::new("uploads/uid-1/a.pdf"))
            .await
            .unwrap();
        assert!(url.ends_with("a.pdf?alt=media&token=tok-9"));
    }

    #[tokio::test]
    async fn test_resolve_url_without_token_fails() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"name": "uploads/uid-1/a.pdf"}"#)));

        let store = connector(mock_http);
        let result = store
            .resolve_download_url(&ObjectHandle::new("uploads/uid-1/a.pdf"))
            .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
