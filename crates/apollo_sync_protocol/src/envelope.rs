//! Transport-neutral request and response envelopes.
//!
//! The engine never talks to a socket directly. It hands an `HttpRequest`
//! to whatever HTTP client the host provides and interprets the
//! `HttpResponse` it gets back. Query values are kept decoded; percent
//! encoding is the client's job.

/// A GET request against the configuration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Path relative to the service base URL, starting with `/`.
    pub path: String,
    /// Query parameters in the order they should be sent.
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request without query parameters.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of the named query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path segments with empty segments removed.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// A response from the configuration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, for log messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lookup() {
        let request = HttpRequest::new("/notifications/v2")
            .with_query("appId", "demo")
            .with_query("cluster", "default");

        assert_eq!(request.query_param("appId"), Some("demo"));
        assert_eq!(request.query_param("cluster"), Some("default"));
        assert_eq!(request.query_param("ip"), None);
    }

    #[test]
    fn segments_skip_empty() {
        let request = HttpRequest::new("/configs//demo/default/application");
        assert_eq!(
            request.segments(),
            vec!["configs", "demo", "default", "application"]
        );
    }

    #[test]
    fn response_status_classes() {
        assert!(HttpResponse::empty(200).is_success());
        assert!(!HttpResponse::empty(304).is_success());
        assert!(!HttpResponse::empty(500).is_success());
        assert_eq!(HttpResponse::new(200, "ok").body_text(), "ok");
    }
}
