use serde::Deserialize;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::models::{CoreError, CoreErrorKind, PackageRecord, SourceTag, names_match};
use crate::sources::RemoteSource;
use crate::sources::SourceResult;
use crate::sources::desc::unix_seconds;

const RPC_VERSION: &str = "5";
/// The RPC rejects search terms shorter than this with an error envelope.
const MIN_SEARCH_TERM_LEN: usize = 2;

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(rename = "type")]
    response_type: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<RpcPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RpcPackage {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    maintainer: Option<String>,
    #[serde(default, rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    last_modified: Option<i64>,
}

impl RpcPackage {
    fn into_record(self) -> PackageRecord {
        let mut record = PackageRecord::new(self.name, self.version, SourceTag::Remote);
        record.description = self.description.unwrap_or_default();
        record.maintainer = self.maintainer;
        record.upstream_url = self.url;
        record.last_modified = self.last_modified.and_then(unix_seconds);
        record
    }
}

/// Client for the AUR RPC interface.
pub struct AurRpcSource {
    agent: ureq::Agent,
    base_url: String,
}

impl AurRpcSource {
    pub fn new(config: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(concat!("pacfind/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: config.base_url.clone(),
        }
    }

    fn call(&self, params: &[(&str, &str)]) -> SourceResult<String> {
        let mut request = self.agent.get(&self.base_url).query("v", RPC_VERSION);
        for (key, value) in params {
            request = request.query(key, value);
        }

        let response = request.call().map_err(|error| {
            CoreError::new(
                CoreErrorKind::SourceUnavailable,
                format!("AUR request failed: {error}"),
            )
            .with_origin(SourceTag::Remote)
        })?;

        response.into_string().map_err(|error| {
            CoreError::new(
                CoreErrorKind::SourceUnavailable,
                format!("failed to read AUR response: {error}"),
            )
            .with_origin(SourceTag::Remote)
        })
    }
}

impl RemoteSource for AurRpcSource {
    fn search_by_term(&self, term: &str) -> SourceResult<Vec<PackageRecord>> {
        if term.chars().count() < MIN_SEARCH_TERM_LEN {
            debug!(term, "search term too short for the AUR; skipping request");
            return Ok(Vec::new());
        }

        let body = self.call(&[("type", "search"), ("by", "name"), ("arg", term)])?;
        parse_search_response(&body)
    }

    fn lookup_exact_version(&self, name: &str) -> SourceResult<Option<String>> {
        let body = self.call(&[("type", "info"), ("arg[]", name)])?;
        parse_info_version(&body, name)
    }
}

fn decode(body: &str) -> SourceResult<RpcEnvelope> {
    let envelope: RpcEnvelope = serde_json::from_str(body).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("malformed AUR response: {error}"),
        )
        .with_origin(SourceTag::Remote)
    })?;

    if envelope.response_type == "error" {
        let message = envelope
            .error
            .unwrap_or_else(|| "unspecified error".to_string());
        return Err(CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("AUR returned an error: {message}"),
        )
        .with_origin(SourceTag::Remote));
    }

    Ok(envelope)
}

pub fn parse_search_response(body: &str) -> SourceResult<Vec<PackageRecord>> {
    Ok(decode(body)?
        .results
        .into_iter()
        .map(RpcPackage::into_record)
        .collect())
}

/// Version of `name` from an info response, `None` when the AUR does not know it.
pub fn parse_info_version(body: &str, name: &str) -> SourceResult<Option<String>> {
    Ok(decode(body)?
        .results
        .into_iter()
        .find(|package| names_match(&package.name, name))
        .map(|package| package.version))
}

#[cfg(test)]
mod tests {
    use super::{parse_info_version, parse_search_response};
    use crate::models::{CoreErrorKind, SourceTag};

    #[test]
    fn maps_search_results_to_remote_records() {
        let body = r#"{"version":5,"type":"search","resultcount":1,"results":[
            {"Name":"google-chrome","Version":"126.0.6478.126-1",
             "Description":"The popular web browser by Google","Maintainer":null,
             "URL":"https://www.google.com/chrome","LastModified":1718900000}]}"#;

        let records = parse_search_response(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "google-chrome");
        assert_eq!(records[0].source, SourceTag::Remote);
        assert!(records[0].maintainer.is_none());
        assert!(records[0].depends.is_empty());
        assert!(records[0].last_modified.is_some());
    }

    #[test]
    fn error_envelope_is_a_parse_failure() {
        let body = r#"{"version":5,"type":"error","resultcount":0,"results":[],"error":"Too many package results."}"#;
        let error = parse_search_response(body).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
        assert!(error.message.contains("Too many package results"));
    }

    #[test]
    fn garbage_body_is_a_parse_failure() {
        let error = parse_search_response("<html>bad gateway</html>").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
        assert_eq!(error.origin, Some(SourceTag::Remote));
    }

    #[test]
    fn info_lookup_returns_none_for_unknown_package() {
        let body = r#"{"version":5,"type":"multiinfo","resultcount":0,"results":[]}"#;
        assert_eq!(parse_info_version(body, "nope").unwrap(), None);
    }
}
