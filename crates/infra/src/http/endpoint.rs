//! Static endpoint descriptors and per-operation request values

use std::fmt;

use serde::Serialize;

use crate::api::errors::ApiError;

/// HTTP methods used by the backend contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether repeating a request can duplicate its effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Safe to repeat (reads, upserts keyed by a natural key)
    Idempotent,
    /// Repeating may create a duplicate
    NonIdempotent,
}

impl Idempotency {
    pub const fn is_idempotent(self) -> bool {
        matches!(self, Self::Idempotent)
    }
}

/// Expected body of a successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Json,
    Empty,
}

/// Static description of one backend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub name: &'static str,
    pub method: HttpMethod,
    /// Path relative to the base URL; `{}` marks a path parameter
    pub path: &'static str,
    pub idempotency: Idempotency,
    pub response: ResponseShape,
    /// Whether the call carries a bearer credential
    pub authenticated: bool,
}

impl Endpoint {
    /// Authenticated endpoint returning JSON; idempotent unless it is a
    /// `POST`
    pub const fn new(name: &'static str, method: HttpMethod, path: &'static str) -> Self {
        let idempotency = match method {
            HttpMethod::Post => Idempotency::NonIdempotent,
            _ => Idempotency::Idempotent,
        };
        Self {
            name,
            method,
            path,
            idempotency,
            response: ResponseShape::Json,
            authenticated: true,
        }
    }

    #[must_use]
    pub const fn idempotent(mut self) -> Self {
        self.idempotency = Idempotency::Idempotent;
        self
    }

    #[must_use]
    pub const fn non_idempotent(mut self) -> Self {
        self.idempotency = Idempotency::NonIdempotent;
        self
    }

    #[must_use]
    pub const fn empty_response(mut self) -> Self {
        self.response = ResponseShape::Empty;
        self
    }

    #[must_use]
    pub const fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Substitute `params` into the path template, percent-encoding each
    ///
    /// # Errors
    /// `Config` when the parameter count does not match the template.
    pub fn render(&self, params: &[&str]) -> Result<String, ApiError> {
        let placeholders = self.path.matches("{}").count();
        if placeholders != params.len() {
            return Err(ApiError::Config(format!(
                "{} expects {placeholders} path parameter(s), got {}",
                self.name,
                params.len()
            )));
        }

        let mut rendered = String::with_capacity(self.path.len() + params.len() * 20);
        let mut segments = self.path.split("{}");
        if let Some(first) = segments.next() {
            rendered.push_str(first);
        }
        for (segment, param) in segments.zip(params) {
            if param.is_empty() {
                return Err(ApiError::Config(format!("{}: empty path parameter", self.name)));
            }
            rendered.push_str(&urlencoding::encode(param));
            rendered.push_str(segment);
        }
        Ok(rendered)
    }
}

/// One logical request, reused unchanged by every retry attempt
#[derive(Debug, Clone)]
pub struct ApiRequest {
    endpoint: Endpoint,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<String>,
    idempotency_key: Option<String>,
}

impl ApiRequest {
    /// Build a request for `endpoint` with the given path parameters
    ///
    /// Non-idempotent endpoints get a fresh idempotency key here, so all
    /// attempts of this request share it.
    ///
    /// # Errors
    /// See [`Endpoint::render`].
    pub fn new(endpoint: Endpoint, params: &[&str]) -> Result<Self, ApiError> {
        let path = endpoint.render(params)?;
        let idempotency_key = (!endpoint.idempotency.is_idempotent())
            .then(|| uuid::Uuid::new_v4().to_string());
        Ok(Self { endpoint, path, query: Vec::new(), body: None, idempotency_key })
    }

    /// Attach a JSON body, serialized once
    ///
    /// # Errors
    /// `Config` if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let encoded = serde_json::to_string(body)
            .map_err(|e| ApiError::Config(format!("cannot encode {} body: {e}", self.endpoint.name)))?;
        self.body = Some(encoded);
        Ok(self)
    }

    #[must_use]
    pub fn query<'a>(mut self, pairs: impl IntoIterator<Item = (&'static str, &'a str)>) -> Self {
        self.query.extend(pairs.into_iter().map(|(k, v)| (k, v.to_string())));
        self
    }

    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(&'static str, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }
}
