// Endpoint file validation.
//
// Every declared endpoint must point at a readable file inside the static
// root before the upload server is contacted. The validated set is turned
// into `endpoint_<name>` query parameters for the negotiation call.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::UploadError;

/// Ordered `(key, value)` pairs sent as a query string.
pub type QueryParams = Vec<(String, String)>;

/// Prefix the remote API expects for endpoint parameters.
pub const ENDPOINT_PARAM_PREFIX: &str = "endpoint_";

/// Check each endpoint file under `static_root` and return its query
/// parameters. Stops at the first file that cannot be read.
pub async fn validate_endpoints(
    endpoints: &BTreeMap<String, String>,
    static_root: &Path,
) -> Result<QueryParams, UploadError> {
    let mut params = Vec::with_capacity(endpoints.len());

    for (name, relative) in endpoints {
        let path = static_root.join(relative);
        ensure_readable_file(&path).await?;
        debug!(endpoint = %name, path = %path.display(), "endpoint file ok");
        params.push((format!("{ENDPOINT_PARAM_PREFIX}{name}"), relative.clone()));
    }

    Ok(params)
}

/// Open `path` for reading and make sure it is a regular file.
pub(crate) async fn ensure_readable_file(path: &Path) -> Result<(), UploadError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| UploadError::not_accessible(path, e))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| UploadError::not_accessible(path, e))?;
    if !metadata.is_file() {
        return Err(UploadError::not_accessible(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok(())
}
