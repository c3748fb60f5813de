// API client module: talks to the remote asset-hosting service.
//
// Two calls make up an upload: a GET that trades the job metadata for a
// one-time upload URL, and a multipart POST of the bundle to that URL. Both
// answer with JSON; a body that is empty or not JSON is a protocol error,
// while JSON without the expected field means the service is unavailable.

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::archive::{BundleArchive, BUNDLE_MIME};
use crate::config::UploadConfig;
use crate::endpoints::QueryParams;
use crate::error::UploadError;

/// Protocol version this client speaks, sent as `cli_version`.
pub const CLI_VERSION: u32 = 2;

/// API method that hands out upload URLs.
pub const UPLOAD_SERVER_METHOD: &str = "apps.getBundleUploadServer";

/// Multipart field carrying the bundle.
pub const FILE_FIELD: &str = "file";

/// One-time upload target returned by the negotiation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
}

/// Version the service assigned to the uploaded bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub version: String,
}

/// A well-formed server reply: either it carries what we asked for, or it
/// lacks the named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply<T> {
    Accepted(T),
    MissingField(&'static str),
}

impl<T> ServerReply<T> {
    fn into_result(self, stage: &'static str) -> Result<T, UploadError> {
        match self {
            ServerReply::Accepted(value) => Ok(value),
            ServerReply::MissingField(field) => {
                warn!(stage, field, "server reply is missing the expected field");
                Err(UploadError::ServiceUnavailable)
            }
        }
    }
}

/// HTTP client for the asset-hosting API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Build a client with the timeouts from `config`.
    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(ApiClient { client })
    }

    /// Ask the service for an upload URL. `endpoint_params` come from
    /// endpoint validation and are appended after the job parameters.
    pub async fn get_upload_server(
        &self,
        config: &UploadConfig,
        endpoint_params: &QueryParams,
    ) -> Result<UploadSession, UploadError> {
        let url = format!("{}{}", config.api_host, UPLOAD_SERVER_METHOD);
        let mut query = job_params(config);
        query.extend(endpoint_params.iter().cloned());

        debug!(%url, endpoints = endpoint_params.len(), "requesting upload server");
        let res = self.client.get(&url).query(&query).send().await?;
        let body = read_body("upload server", res).await?;

        let session = interpret_upload_server(&parse_reply("upload server", &body)?)
            .into_result("upload server")?;
        info!("upload server obtained");
        Ok(session)
    }

    /// Stream `bundle` to the negotiated URL and return the assigned version.
    pub async fn upload_bundle(
        &self,
        bundle: &BundleArchive,
        session: &UploadSession,
    ) -> Result<UploadResult, UploadError> {
        let file = tokio::fs::File::open(&bundle.path)
            .await
            .map_err(|e| UploadError::not_accessible(&bundle.path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| UploadError::not_accessible(&bundle.path, e))?
            .len();

        // Declaring the length lets reqwest send a Content-Length for the
        // whole form while the file itself is still read lazily.
        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, len)
            .file_name(bundle.file_name())
            .mime_str(BUNDLE_MIME)?;
        let form = Form::new().part(FILE_FIELD, part);

        info!(file = %bundle.file_name(), bytes = len, "uploading bundle");
        let res = self
            .client
            .post(&session.upload_url)
            .multipart(form)
            .send()
            .await?;
        let body = read_body("upload", res).await?;

        let result = interpret_upload(&parse_reply("upload", &body)?).into_result("upload")?;
        info!(version = %result.version, "bundle accepted");
        Ok(result)
    }
}

/// Fixed negotiation parameters, in the order the service documents them.
fn job_params(config: &UploadConfig) -> QueryParams {
    vec![
        ("app_id".into(), config.app_id.clone()),
        ("environment".into(), config.environment.clone()),
        ("cli_version".into(), CLI_VERSION.to_string()),
        ("v".into(), config.api_version.clone()),
        ("access_token".into(), config.access_token.clone()),
    ]
}

async fn read_body(stage: &'static str, res: Response) -> Result<String, UploadError> {
    let status = res.status();
    if !status.is_success() {
        warn!(stage, %status, "server answered with a non-success status");
    }
    Ok(res.text().await?)
}

/// Parse a reply body. Empty, non-JSON and falsy JSON (`null`, `false`,
/// `0`, `""`) bodies are protocol violations.
pub fn parse_reply(stage: &'static str, body: &str) -> Result<Value, UploadError> {
    let malformed = |detail: String| UploadError::MalformedServerResponse { stage, detail };

    if body.trim().is_empty() {
        return Err(malformed("empty body".into()));
    }
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    if is_falsy(&value) {
        return Err(malformed(format!("unexpected payload {value}")));
    }
    Ok(value)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Non-empty string (or number, rendered as a string) at `pointer`.
fn non_empty_field(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Classify a negotiation reply: `response.upload_url` is required.
pub fn interpret_upload_server(value: &Value) -> ServerReply<UploadSession> {
    match non_empty_field(value, "/response/upload_url") {
        Some(upload_url) => ServerReply::Accepted(UploadSession { upload_url }),
        None => ServerReply::MissingField("response.upload_url"),
    }
}

/// Classify an upload reply: `version` is required.
pub fn interpret_upload(value: &Value) -> ServerReply<UploadResult> {
    match non_empty_field(value, "/version") {
        Some(version) => ServerReply::Accepted(UploadResult { version }),
        None => ServerReply::MissingField("version"),
    }
}
