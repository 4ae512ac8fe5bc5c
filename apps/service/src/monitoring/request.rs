use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use super::types::HttpMethod;
use crate::database::models::Monitor;

pub const USER_AGENT_VALUE: &str = concat!("Vigil Uptime Checker/", env!("CARGO_PKG_VERSION"));

/// Everything needed to send one probe request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
}

/// Build the probe request for `monitor` against `uri`.
///
/// `uri` differs from the stored monitor URL while following redirects.
pub fn from_monitor(monitor: &Monitor, uri: &Url) -> RequestDescriptor {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    if monitor.force_no_cache {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    RequestDescriptor { method: monitor.request_method, url: uri.clone(), headers }
}
