/// Request methods understood by the server.
///
/// Only GET is actionable. Every other method token maps to `UNKNOWN` and the
/// request is dropped without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a static resource
    GET,
    /// Any method token other than `GET`
    UNKNOWN,
}

impl Method {
    /// Parses a method token.
    ///
    /// Matching is exact and case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use evserve::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Method::GET);
    /// assert_eq!(Method::from_token("get"), Method::UNKNOWN);
    /// assert_eq!(Method::from_token("PUT"), Method::UNKNOWN);
    /// ```
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::GET,
            _ => Method::UNKNOWN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::UNKNOWN => "UNKNOWN",
        }
    }
}

/// A decoded request line.
///
/// Produced and consumed within the handling of a single line; nothing about
/// a request outlives the response it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The request method
    pub method: Method,
    /// The requested path exactly as it appeared on the wire (e.g. "/index.html")
    pub path: String,
    /// Protocol version token, kept but never validated. Empty when absent.
    pub version: String,
}

impl Request {
    /// Convenience constructor for GET requests.
    pub fn get(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            version: version.into(),
        }
    }
}
