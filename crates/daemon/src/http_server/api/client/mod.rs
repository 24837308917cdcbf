//! Client for the daemon's HTTP API, used by the CLI

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

#[allow(clippy::module_inception)]
mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

/// A request the daemon understands, paired with the response it yields
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}

/// Absolute endpoint URL on the daemon
pub fn endpoint(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    url.set_path(path);
    url.set_query(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_replaces_path() {
        let base = Url::parse("http://127.0.0.1:8095/ignored?x=1").unwrap();
        assert_eq!(
            endpoint(&base, "/VolumeDriver.Mount").as_str(),
            "http://127.0.0.1:8095/VolumeDriver.Mount"
        );
    }
}
