use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};

use crate::multistatus::{base_path, parse_multistatus, strip_base, trim_dir_path};
use crate::{RemoteFile, RemoteSource, WebDavError};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;
const MAX_ERROR_BODY: usize = 200;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:"><D:prop><D:resourcetype/><D:getcontentlength/></D:prop></D:propfind>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDavSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct WebDavClient {
    http: reqwest::Client,
    base: String,
    base_path: String,
    username: String,
    password: String,
}

impl WebDavClient {
    /// Builds a client that accepts self-signed certificates and follows a
    /// bounded number of redirects.
    pub fn new(settings: &WebDavSettings) -> Result<Self, WebDavError> {
        let base = settings.url.trim().trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(WebDavError::InvalidRequest(format!(
                "webdav url must be http(s): {}",
                settings.url
            )));
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_path: base_path(&base),
            base,
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// Absolute URL for a path relative to the base URL, each segment percent-encoded.
    pub fn url_for(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let mut url = format!("{}/{}", self.base, encoded.join("/"));
        if path.ends_with('/') && !encoded.is_empty() {
            url.push('/');
        }
        url
    }

    async fn propfind(&self, path: &str, depth: &str) -> Result<String, WebDavError> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|err| WebDavError::InvalidRequest(err.to_string()))?;
        let url = self.url_for(path);
        let response = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::MULTI_STATUS && status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, url, body));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RemoteSource for WebDavClient {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteFile>, WebDavError> {
        let dir = trim_dir_path(path);
        let request_path = format!("{}/", dir.trim_end_matches('/'));
        let body = self.propfind(&request_path, "1").await?;
        let entries = parse_multistatus(&body)?;
        Ok(entries
            .into_iter()
            .map(|mut entry| {
                entry.path = strip_base(&entry.path, &self.base_path);
                entry
            })
            .filter(|entry| entry.path != dir)
            .collect())
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes, WebDavError> {
        let url = self.url_for(path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(REFERER, format!("{}/", self.base))
            .header(ORIGIN, &self.base)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, url, body));
        }
        Ok(response.bytes().await?)
    }

    async fn probe(&self, root: &str) -> Result<(), WebDavError> {
        let root = format!("{}/", trim_dir_path(root).trim_end_matches('/'));
        self.propfind(&root, "0").await.map(|_| ())
    }
}

fn status_error(status: StatusCode, url: String, body: String) -> WebDavError {
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    WebDavError::Status {
        status: status.as_u16(),
        url,
        body,
    }
}
