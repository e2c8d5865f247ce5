// histo-net/src/validation.rs
use histo_common::error::{HistoError, Result};
use histo_common::model::VersionKey;
use url::Url;

/// The worker runs locally or on a LAN host; plain http is expected alongside https.
pub fn validate_base_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| HistoError::Config(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(HistoError::Config(format!(
                "Invalid URL scheme for '{url_str}': Must be http or https, but got '{other}'"
            )))
        }
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(HistoError::Config(format!(
            "URL '{url_str}' cannot be used as an API base"
        )));
    }
    Ok(url)
}

/// Appends path segments to `base`, percent-encoding each one.
///
/// A version key travels as a single segment, so its `/` is encoded as `%2F`.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            HistoError::Config(format!("URL '{base}' cannot be used as an API base"))
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

pub fn key_url(base: &Url, endpoint: &str, key: &VersionKey) -> Result<Url> {
    endpoint_url(base, &[endpoint, &key.to_string()])
}
