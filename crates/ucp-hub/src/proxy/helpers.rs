//! Pure helpers: endpoint policy, resource paths, merchant error bodies,
//! backoff (no HTTP, no status logic).

use std::time::Duration;

use serde_json::{Map, Value};
use url::{Host, Url};

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::types::{Capability, OperationKind};

use super::shape::{scalar_arg, CallShape, ID_ARG};

const MAX_BACKOFF: Duration = Duration::from_secs(5);
const MAX_ERROR_TEXT_CHARS: usize = 2048;

/// Parse a merchant base URL and apply the transport policy.
///
/// The returned URL has no query, fragment or trailing slash.
pub(crate) fn normalize_endpoint(raw: &str, config: &HubConfig) -> HubResult<Url> {
    let insecure = |reason: &str| HubError::InsecureEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(raw.trim()).map_err(|e| insecure(&format!("invalid URL: {}", e)))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            let allowlisted = config
                .insecure_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(&host));
            if config.require_tls && !is_local_host(&url) && !allowlisted {
                return Err(insecure("plain http is only allowed for local hosts"));
            }
        }
        other => return Err(insecure(&format!("unsupported scheme: {other}"))),
    }

    if url.host().is_none() {
        return Err(insecure("missing host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(insecure("credentials in URL are not allowed"));
    }

    url.set_query(None);
    url.set_fragment(None);
    if url.path() != "/" {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }
    Ok(url)
}

/// Session key for a normalized endpoint.
pub(crate) fn endpoint_key(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

/// Loopback addresses, `localhost`, and the reserved `.localhost`/`.test` TLDs.
pub(crate) fn is_local_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".test")
        }
        None => false,
    }
}

/// Append raw (unencoded) path segments to a base URL.
pub(crate) fn join_segments<I, S>(base: &Url, segments: I) -> HubResult<Url>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| HubError::InsecureEndpoint {
            endpoint: base.to_string(),
            reason: "URL cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Manifest URL: base plus the configured discovery path.
pub(crate) fn discovery_url(base: &Url, discovery_path: &str) -> HubResult<Url> {
    join_segments(base, discovery_path.split('/').filter(|s| !s.is_empty()))
}

/// Resource path template for a capability: config override, then manifest.
pub(crate) fn resource_template<'a>(capability: &'a Capability, config: &'a HubConfig) -> &'a str {
    config
        .endpoint_map
        .get(&capability.name)
        .map(String::as_str)
        .unwrap_or(&capability.resource_path)
}

/// Raw path segments for a call.
///
/// A trailing `{id}` segment is dropped to get the collection root. Other
/// `{field}` segments are filled from `args` and the fields are removed from
/// the body.
pub(crate) fn build_segments(
    capability_name: &str,
    template: &str,
    shape: &CallShape,
    args: &mut Map<String, Value>,
) -> HubResult<Vec<String>> {
    let invalid = |message: String| HubError::InvalidArguments {
        name: capability_name.to_string(),
        message,
    };

    let mut template_segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    if template_segments.last() == Some(&"{id}") {
        template_segments.pop();
    }

    let mut segments = Vec::with_capacity(template_segments.len() + 2);
    for segment in template_segments {
        match segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            Some(field) => {
                let value = if field == ID_ARG {
                    shape.id.clone()
                } else {
                    scalar_arg(args, field).map_err(invalid)?
                };
                let value = value
                    .ok_or_else(|| invalid(format!("missing path argument: {field}")))?;
                if field != ID_ARG {
                    args.remove(field);
                }
                segments.push(value);
            }
            None => segments.push(segment.to_string()),
        }
    }

    match shape.operation {
        OperationKind::Create => {}
        OperationKind::Update => {
            segments.extend(shape.id.clone());
        }
        OperationKind::Transition => {
            segments.extend(shape.id.clone());
            segments.extend(shape.action.clone());
        }
    }

    Ok(segments)
}

/// HTTP method for an operation.
pub(crate) fn method_for(operation: OperationKind) -> reqwest::Method {
    match operation {
        OperationKind::Update => reqwest::Method::PUT,
        OperationKind::Create | OperationKind::Transition => reqwest::Method::POST,
    }
}

/// Merchant error body as a payload: JSON if it parses, else truncated text.
pub(crate) fn parse_error_body(body: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => Some(json),
        Err(_) => Some(Value::String(
            trimmed.chars().take(MAX_ERROR_TEXT_CHARS).collect(),
        )),
    }
}

/// Success body: JSON, `null` when empty, raw text when not JSON.
pub(crate) fn parse_success_body(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Upper bound of the full-jitter backoff before retry number `retry` (1-based).
pub(crate) fn backoff_ceiling(base_ms: u64, retry: u32) -> Duration {
    let factor = 1_u64 << retry.saturating_sub(1).min(20);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}
