//! Upload method and destination bucket resolution

use super::check::{best_match, DIRECT_METHOD};
use crate::error::UploadError;
use crate::remote::{RemoteService, UploadKind};
use tracing::{debug, info};

/// Resolve the upload method. Without a request the first cloud the server
/// supports for `kind` is used, falling back to direct upload.
pub fn suggest_method(
    remote: &dyn RemoteService,
    kind: UploadKind,
    requested: Option<&str>,
) -> Result<String, UploadError> {
    if requested == Some(DIRECT_METHOD) {
        return Ok(DIRECT_METHOD.to_string());
    }

    let supported = remote
        .supported_clouds(kind)
        .map_err(|e| UploadError::Bucket(e.to_string()))?;

    match requested {
        Some(m) => best_match(&supported, m)
            .map(str::to_string)
            .ok_or_else(|| UploadError::Bucket(format!("upload method {:?} is not supported", m))),
        None => {
            let method = supported
                .first()
                .cloned()
                .unwrap_or_else(|| DIRECT_METHOD.to_string());
            debug!(method = %method, "Suggested upload method");
            Ok(method)
        }
    }
}

/// Resolve the bucket for `method`. Direct upload has no bucket; a requested
/// bucket must be in the server's list; otherwise the server suggests one.
pub fn suggest_bucket(
    remote: &dyn RemoteService,
    kind: UploadKind,
    method: &str,
    requested: Option<&str>,
) -> Result<String, UploadError> {
    if method == DIRECT_METHOD {
        return Ok(String::new());
    }

    let bucket = match requested {
        Some(b) => {
            let buckets = remote
                .bucket_list(kind, method)
                .map_err(|e| UploadError::Bucket(e.to_string()))?;
            best_match(&buckets, b).map(str::to_string).ok_or_else(|| {
                UploadError::Bucket(format!(
                    "bucket {:?} is not available for {}, choose one of: {}",
                    b,
                    method,
                    buckets.join(", ")
                ))
            })?
        }
        None => remote
            .suggested_bucket(kind, method)
            .map_err(|e| UploadError::Bucket(e.to_string()))?,
    };

    if bucket.is_empty() {
        return Err(UploadError::Bucket(format!("no bucket available for {}", method)));
    }

    info!("Bucket {:?} is chosen", bucket);
    Ok(bucket)
}
