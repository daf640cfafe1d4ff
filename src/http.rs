//! HTTP API for documentation bundles
//!
//! ## Routes
//! - `GET /` - List bundles (HTML, or JSON with `Accept: application/json` / `?format=json`)
//! - `POST /` - Upload a bundle; zip bytes as the body, name via `?name=`
//!   or the `Content-Disposition` / `X-Filename` filename
//! - `GET /health` - Health check
//! - `GET /{id}.zip` - Download the whole bundle archive
//! - `GET /{id}` - Redirect to `/{id}/`
//! - `GET /{id}/{path}` - Serve one file from the bundle (`If-Modified-Since` aware)
//!
//! `HEAD` is accepted wherever `GET` is.
//!
//! ## Example Usage
//!
//! ```bash
//! # Upload docs for "Django REST Framework" (stored as django-rest-framework)
//! curl -X POST --data-binary @docs.zip \
//!      "http://localhost:8080/?name=Django%20REST%20Framework"
//!
//! # Upload, naming the bundle after the file
//! curl -X POST -H 'Content-Disposition: attachment; filename="requests.zip"' \
//!      --data-binary @requests.zip http://localhost:8080/
//!
//! # Browse
//! curl http://localhost:8080/requests/
//! curl -H 'Accept: application/json' http://localhost:8080/
//! ```

use crate::archive::EntryFetch;
use crate::catalog::CatalogEntry;
use crate::error::StoreError;
use crate::identifier::BundleId;
use crate::store::BundleStore;
use crate::upload::UploadRequest;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap};
use hyper::http::response::Builder;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Default upload body limit (64 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP server state
pub struct HttpServer {
    store: Arc<BundleStore>,
    bind_addr: SocketAddr,
    max_upload_bytes: usize,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(store: Arc<BundleStore>, bind_addr: SocketAddr) -> Self {
        Self {
            store,
            bind_addr,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Set the largest accepted upload body
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StoreError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request to its handler and map errors to responses
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        let wants_json = wants_json(req.headers(), &query);
        let if_modified_since = req
            .headers()
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        debug!(method = %method, path = %path, "Incoming request");

        let result = match path.as_str() {
            "/" => match method {
                Method::GET | Method::HEAD => self.handle_list(wants_json).await,
                Method::POST => self.handle_upload(req, &query).await,
                _ => Ok(method_not_allowed("GET, HEAD, POST")),
            },
            "/health" => match method {
                Method::GET | Method::HEAD => self.handle_health().await,
                _ => Ok(method_not_allowed("GET, HEAD")),
            },
            p => match method {
                Method::GET | Method::HEAD => {
                    self.handle_bundle_path(&p[1..], if_modified_since).await
                }
                _ => Ok(method_not_allowed("GET, HEAD")),
            },
        };

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.is_client_error() {
                    debug!(method = %method, path = %path, error = %e, "Request rejected");
                } else {
                    error!(method = %method, path = %path, error = %e, "Request error");
                }
                error_response(&e)
            }
        };

        if method == Method::HEAD {
            *response.body_mut() = Full::new(Bytes::new());
        }

        Ok(response)
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Result<Response<Full<Bytes>>, StoreError> {
        let catalog = self.store.catalog().await?;
        let body = serde_json::json!({
            "status": "ok",
            "bundles": catalog.len(),
        });

        Ok(json_response(StatusCode::OK, body.to_string()))
    }

    /// GET / - List bundles
    async fn handle_list(&self, as_json: bool) -> Result<Response<Full<Bytes>>, StoreError> {
        let catalog = self.store.catalog().await?;

        if as_json {
            let body = serde_json::to_string(&catalog)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            return Ok(json_response(StatusCode::OK, body));
        }

        let body = render_index(&catalog);
        Ok(finish(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .header(header::CONTENT_LENGTH, body.len()),
            Bytes::from(body),
        ))
    }

    /// POST / - Upload a bundle
    async fn handle_upload<B>(
        &self,
        req: Request<B>,
        query: &str,
    ) -> Result<Response<Full<Bytes>>, StoreError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let filename = upload_filename(req.headers());
        let name = query_param(query, "name");

        let limit = self.max_upload_bytes;
        let body = Limited::new(req.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    StoreError::PayloadTooLarge(limit)
                } else {
                    StoreError::Validation(format!("failed to read upload body: {}", e))
                }
            })?
            .to_bytes();

        let mut upload = UploadRequest::new(body);
        upload.name = name;
        upload.filename = filename;

        let id = self.store.commit(&upload).await?;
        let location = format!("/{}/", id);

        let body = serde_json::json!({
            "id": id,
            "url": location,
        });

        Ok(finish(
            Response::builder()
                .status(StatusCode::CREATED)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::LOCATION, location.as_str()),
            Bytes::from(body.to_string()),
        ))
    }

    /// GET /{id}.zip, /{id}, /{id}/{path}
    async fn handle_bundle_path(
        &self,
        rest: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<Response<Full<Bytes>>, StoreError> {
        let parse_id = |raw: &str| {
            BundleId::parse(raw).ok_or_else(|| StoreError::NotFound(format!("bundle {}", raw)))
        };

        if let Some((raw_id, entry_path)) = rest.split_once('/') {
            let id = parse_id(raw_id)?;
            let entry_path = urlencoding::decode(entry_path)
                .map_err(|_| StoreError::NotFound(format!("{} in bundle {}", entry_path, id)))?;
            return self.handle_entry(&id, &entry_path, if_modified_since).await;
        }

        if let Some(raw_id) = rest.strip_suffix(".zip") {
            let id = parse_id(raw_id)?;
            return self.handle_archive(&id).await;
        }

        let id = parse_id(rest)?;
        if !self.store.exists(&id).await {
            return Err(StoreError::NotFound(format!("bundle {}", id)));
        }
        Ok(finish(
            Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header(header::LOCATION, format!("/{}/", id)),
            Bytes::new(),
        ))
    }

    /// Serve one file out of a bundle
    async fn handle_entry(
        &self,
        id: &BundleId,
        path: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<Response<Full<Bytes>>, StoreError> {
        match self.store.fetch_entry(id, path, if_modified_since).await? {
            EntryFetch::NotModified { expires } => Ok(finish(
                Response::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .header(header::EXPIRES, format_http_date(&expires)),
                Bytes::new(),
            )),
            EntryFetch::Content(entry) => Ok(finish(
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, entry.content_type)
                    .header(header::CONTENT_LENGTH, entry.data.len())
                    .header(header::LAST_MODIFIED, format_http_date(&entry.modified)),
                Bytes::from(entry.data),
            )),
        }
    }

    /// Serve the whole bundle archive
    async fn handle_archive(&self, id: &BundleId) -> Result<Response<Full<Bytes>>, StoreError> {
        let archive = self.store.fetch_archive(id).await?;

        Ok(finish(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, archive.content_type)
                .header(header::CONTENT_LENGTH, archive.data.len())
                .header(header::LAST_MODIFIED, format_http_date(&archive.modified))
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.zip\"", id),
                ),
            Bytes::from(archive.data),
        ))
    }
}

/// Format a timestamp as an HTTP date (IMF-fixdate)
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header value
///
/// Accepts IMF-fixdate plus the obsolete RFC 850 and asctime forms.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    // Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(naive.and_utc());
    }
    // Sun Nov  6 08:49:37 1994
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

fn wants_json(headers: &HeaderMap, query: &str) -> bool {
    if query_param(query, "format").as_deref() == Some("json") {
        return true;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Original filename of an upload, from `Content-Disposition` or `X-Filename`
fn upload_filename(headers: &HeaderMap) -> Option<String> {
    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok());
    if let Some(disposition) = disposition {
        for param in disposition.split(';').map(str::trim) {
            if let Some(value) = param.strip_prefix("filename=") {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn render_index(entries: &[CatalogEntry]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Documentation</title></head>\n<body>\n<h1>Documentation</h1>\n",
    );

    if entries.is_empty() {
        html.push_str("<p>No documentation bundles have been uploaded.</p>\n");
    } else {
        html.push_str("<table>\n<tr><th>Bundle</th><th>Size</th><th>Uploaded</th></tr>\n");
        for entry in entries {
            // identifiers are [a-z0-9-] only, nothing to escape
            let _ = writeln!(
                html,
                "<tr><td><a href=\"/{id}/\">{id}</a> (<a href=\"/{id}.zip\">zip</a>)</td><td>{size}</td><td>{modified}</td></tr>",
                id = entry.id,
                size = entry.size,
                modified = entry.modified.format("%Y-%m-%d %H:%M UTC"),
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    finish(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json"),
        Bytes::from(body),
    )
}

fn method_not_allowed(allow: &'static str) -> Response<Full<Bytes>> {
    finish(
        Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header(header::ALLOW, allow)
            .header(header::CONTENT_TYPE, "text/plain"),
        Bytes::from_static(b"Method Not Allowed"),
    )
}

fn error_response(err: &StoreError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let message = if status.is_server_error() {
        status
            .canonical_reason()
            .unwrap_or("Internal Server Error")
            .to_string()
    } else {
        err.to_string()
    };
    finish(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain"),
        Bytes::from(message),
    )
}

fn finish(builder: Builder, body: Bytes) -> Response<Full<Bytes>> {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build response");
        let mut response = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}
