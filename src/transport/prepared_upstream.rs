use crate::config::UpstreamConfig;
use crate::error::RelayError;

const SEC_CH_UA: &str = r#""Microsoft Edge";v="143", "Chromium";v="143", "Not A(Brand";v="24""#;

/// Upstream endpoint and header set, computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    url: url::Url,
    headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Parse the upstream URL and build the static request headers.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the URL does not parse or a
    /// configured header value is not a valid HTTP header value.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let url = url::Url::parse(&upstream.url)
            .map_err(|err| RelayError::Config(format!("Invalid upstream URL: {err}")))?;
        let headers = Self::build_headers(upstream)?;
        Ok(Self { url, headers })
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.headers
    }

    // The upstream only serves requests that look like they came from its
    // own web client.
    fn build_headers(upstream: &UpstreamConfig) -> Result<http::HeaderMap, RelayError> {
        use http::header::{HeaderName, HeaderValue};

        let mut headers = http::HeaderMap::with_capacity(12);
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            http::header::ACCEPT_LANGUAGE,
            config_header_value("upstream.accept_language", &upstream.accept_language)?,
        );
        headers.insert(
            http::header::REFERER,
            config_header_value("upstream.referer", &upstream.referer)?,
        );

        let fixed: [(&'static str, &'static str); 7] = [
            ("priority", "u=1, i"),
            ("sec-ch-ua", SEC_CH_UA),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
        ];
        for (name, value) in fixed {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        Ok(headers)
    }
}

fn config_header_value(field: &str, value: &str) -> Result<http::HeaderValue, RelayError> {
    http::HeaderValue::from_str(value)
        .map_err(|err| RelayError::Config(format!("{field} is not a valid header value: {err}")))
}
