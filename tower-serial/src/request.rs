use bytes::Bytes;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Uri;
use http::header::HeaderName;

use crate::error::DispatchError;

/// Response type produced by transports.
pub type Response = http::Response<Bytes>;

/// A fully built, immutable request descriptor.
///
/// Cloning is cheap (the body is reference counted) so the same request can
/// be handed to the transport again after a rate-limit rejection.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Produce the transport-level request for one attempt.
    pub(crate) fn to_http(&self) -> http::Request<Bytes> {
        let mut req = http::Request::new(self.body.clone());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

/// Mutable view of a request before it is submitted.
///
/// Handed to the configured defaults hook and to per-call customizers.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    pub(crate) fn new(uri: String) -> Self {
        Self {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The filled URL.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Append a header. Existing values with the same name are kept.
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    /// Set a header, replacing any existing values.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Shorthand for a `POST` with `body`.
    pub fn post(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.method(Method::POST).body(body)
    }

    /// Serialize `value` as the body and mark it as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error; the builder is left untouched.
    #[cfg(feature = "json")]
    pub fn json<T>(&mut self, value: &T) -> Result<&mut Self, serde_json::Error>
    where
        T: serde::Serialize + ?Sized,
    {
        let body = serde_json::to_vec(value)?;
        self.set_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        Ok(self.body(body))
    }

    pub(crate) fn build(self) -> Result<Request, DispatchError> {
        let uri = self
            .uri
            .parse::<Uri>()
            .map_err(|e| DispatchError::InvalidArgument(format!("{}: {}", self.uri, e)))?;

        Ok(Request {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body,
        })
    }
}
