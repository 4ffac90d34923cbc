use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Caller-supplied description of a resource request, independent of authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    body: Vec<u8>,
    content_type: Option<&'static str>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: Vec::new(),
            content_type: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST with a raw body. No content type is attached.
    pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::new(Method::POST, url)
        }
    }

    /// POST with a JSON-encoded body.
    pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            body: serde_json::to_vec(body)?,
            content_type: Some(JSON_CONTENT_TYPE),
            ..Self::new(Method::POST, url)
        })
    }

    /// POST with a literal `{}` body, as expected by command endpoints that take no arguments.
    pub fn post_empty_object(url: Url) -> Self {
        Self {
            body: b"{}".to_vec(),
            content_type: Some(JSON_CONTENT_TYPE),
            ..Self::new(Method::POST, url)
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Materialize the request with a bearer token attached.
    pub(crate) fn authorize(&self, access_token: &str) -> HttpRequest {
        let mut headers = vec![(
            AUTHORIZATION.as_str().to_owned(),
            format!("Bearer {access_token}"),
        )];
        if let Some(content_type) = self.content_type {
            headers.push((CONTENT_TYPE.as_str().to_owned(), content_type.to_owned()));
        }
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body: self.body.clone(),
        }
    }
}

/// Fully prepared HTTP request handed to a [`super::Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Form-encoded POST, used for token endpoint exchanges.
    pub(crate) fn form(url: Url, body: String) -> Self {
        Self {
            method: Method::POST,
            url,
            headers: vec![(CONTENT_TYPE.as_str().to_owned(), FORM_CONTENT_TYPE.to_owned())],
            body: body.into_bytes(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
