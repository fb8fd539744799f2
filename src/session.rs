//! Authenticated upload session
//!
//! Uploading raw files goes through a storage intermediary that only accepts
//! a browser-style session: the login form is fetched, its hidden fields are
//! harvested, credentials are posted, and the resulting cookies authorise the
//! upload-URL and transfer calls. Form structure is re-read on every login.

use crate::error::{Error, Result};
use crate::models::{LoginSettings, UploadMode};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Header some login pages use to announce the post-login redirect
const AUTO_LOGIN_HEADER: &str = "X-Auto-Login";
/// Anti-forgery cookie copied into the login form
const GALX_COOKIE: &str = "GALX";

/// Obtains upload URLs and moves file bodies to the storage intermediary
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Requests a fresh one-time upload URL
    async fn upload_url(&self) -> Result<String>;

    /// Sends the file to `upload_url` and returns the storage identifier (gsid)
    async fn transfer(&self, upload_url: &str, file: &Path, mode: UploadMode) -> Result<String>;
}

/// Produces an authenticated storage session from user credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<Arc<dyn StorageGateway>>;
}

/// Performs the two-step form login
#[derive(Debug, Clone)]
pub struct AuthSession {
    settings: LoginSettings,
    timeout: Option<Duration>,
}

impl AuthSession {
    pub fn new(settings: LoginSettings) -> Self {
        Self {
            settings,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Logs in and returns a cookie-carrying session
    ///
    /// # Errors
    ///
    /// Returns `Error::Authentication` when the submission lands back on the
    /// login endpoint or the configured success markers are absent
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let login_page = http.get(&self.settings.accounts_url).send().await?;
        let auto_login = login_page
            .headers()
            .get(AUTO_LOGIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let galx = login_page
            .cookies()
            .find(|c| c.name() == GALX_COOKIE)
            .map(|c| c.value().to_string());
        let html = login_page.text().await?;

        let mut payload = harvest_form_fields(&html)?;
        debug!("Harvested {} login form fields", payload.len());
        payload.insert("Email".to_string(), username.to_string());
        payload.insert("Passwd".to_string(), password.to_string());
        if let Some(header) = auto_login {
            payload.insert("continue".to_string(), continue_target(&header));
        }
        if let Some(galx) = galx {
            payload.insert(GALX_COOKIE.to_string(), galx);
        }

        let login_url = Url::parse(&self.settings.login_url)
            .map_err(|e| Error::config(format!("invalid login URL: {}", e)))?;
        let response = http.post(login_url.clone()).form(&payload).send().await?;
        drop(payload);

        let landed_on = response.url().clone();
        let body = response.text().await?;
        check_login_response(&login_url, &landed_on, &body, &self.settings.success_markers)?;

        info!("Logged in as {}", username);
        Ok(Session {
            http,
            upload_url_endpoint: self.settings.upload_url_endpoint.clone(),
        })
    }
}

#[async_trait]
impl Authenticator for AuthSession {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn StorageGateway>> {
        let session: Arc<dyn StorageGateway> = Arc::new(self.login(username, password).await?);
        Ok(session)
    }
}

/// Collects `name`/`value` pairs of every `<input>` with a value in the first form
pub fn harvest_form_fields(html: &str) -> Result<HashMap<String, String>> {
    let form_re = Regex::new(r"(?is)<form\b.*?</form>")?;
    let input_re = Regex::new(r"(?is)<input\b[^>]*>")?;
    let name_re = Regex::new(r#"(?is)\bname\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;
    let value_re = Regex::new(r#"(?is)\bvalue\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;

    let mut fields = HashMap::new();
    let Some(form) = form_re.find(html) else {
        return Ok(fields);
    };

    for input in input_re.find_iter(form.as_str()) {
        let tag = input.as_str();
        let name = name_re.captures(tag).and_then(|c| c.get(1).or(c.get(2)));
        let value = value_re.captures(tag).and_then(|c| c.get(1).or(c.get(2)));
        if let (Some(name), Some(value)) = (name, value) {
            fields.insert(name.as_str().to_string(), value.as_str().to_string());
        }
    }
    Ok(fields)
}

/// Redirect target hidden in the auto-login header, which arrives encoded twice
pub fn continue_target(header: &str) -> String {
    let once = percent_decode_str(header).decode_utf8_lossy().into_owned();
    let twice = percent_decode_str(&once).decode_utf8_lossy().into_owned();
    twice
        .rsplit("continue=")
        .next()
        .unwrap_or_default()
        .to_string()
}

fn check_login_response(
    login_url: &Url,
    landed_on: &Url,
    body: &str,
    success_markers: &[String],
) -> Result<()> {
    if landed_on == login_url {
        return Err(Error::authentication(
            "login form was served again; check user name and password",
        ));
    }
    if !success_markers.is_empty() && !success_markers.iter().any(|m| body.contains(m.as_str()))
    {
        return Err(Error::authentication(format!(
            "post-login page at {} lacks the expected markers",
            landed_on
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    url: String,
}

/// Parses the upload-URL endpoint body, which may be JSON or a single-quoted literal
pub fn parse_upload_url(body: &str) -> std::result::Result<String, String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Err("session rejected: upload URL endpoint returned an HTML page".to_string());
    }
    let parsed: std::result::Result<UploadUrlResponse, _> = serde_json::from_str(trimmed)
        .or_else(|_| serde_json::from_str(&trimmed.replace('\'', "\"")));
    parsed
        .map(|r| r.url)
        .map_err(|e| format!("unexpected upload URL response: {}", e))
}

/// Extracts the storage identifier from a transfer response body
pub fn parse_gsid(body: &str) -> std::result::Result<String, String> {
    let ids: Vec<String> =
        serde_json::from_str(body).map_err(|e| format!("unexpected transfer response: {}", e))?;
    ids.into_iter()
        .next()
        .ok_or_else(|| "transfer response holds no storage id".to_string())
}

/// An authenticated cookie session; shared read-only by all uploads of a run
#[derive(Debug, Clone)]
pub struct Session {
    http: Client,
    upload_url_endpoint: String,
}

impl Session {
    async fn simple_form(file: &Path) -> Result<Form> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Form::new().part("file", Part::bytes(bytes).file_name(file_name)))
    }

    async fn multipart_form(file: &Path) -> Result<Form> {
        let handle = tokio::fs::File::open(file).await?;
        let length = handle.metadata().await?.len();
        let part = Part::stream_with_length(handle, length)
            .file_name(file.display().to_string())
            .mime_str("application/octet-stream")?;
        Ok(Form::new().part("documents", part).text("composite", "NONE"))
    }
}

#[async_trait]
impl StorageGateway for Session {
    async fn upload_url(&self) -> Result<String> {
        let response = self.http.get(&self.upload_url_endpoint).send().await?;
        if !response.status().is_success() {
            return Err(Error::remote_service(format!(
                "upload URL request failed with status {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        parse_upload_url(&body).map_err(Error::remote_service)
    }

    async fn transfer(&self, upload_url: &str, file: &Path, mode: UploadMode) -> Result<String> {
        let request = match mode {
            UploadMode::Simple => self.http.post(upload_url).multipart(Self::simple_form(file).await?),
            UploadMode::Multipart => self
                .http
                .post(upload_url)
                .header("Prefer", "respond-async")
                .multipart(Self::multipart_form(file).await?),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::transfer(file, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transfer(file, e.to_string()))?;
        if !status.is_success() {
            warn!("Transfer of {} answered {}", file.display(), status);
            return Err(Error::transfer(
                file,
                format!("storage answered {}: {}", status, body.trim()),
            ));
        }
        parse_gsid(&body).map_err(|reason| Error::transfer(file, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
<html><body>
<form novalidate method="post" action="https://accounts.example/ServiceLoginAuth" id="gaia_loginform">
  <input name="GALX" type="hidden" value="abc123">
  <input type="hidden" name='service' value='ee'>
  <input type="hidden" name="_utf8" value="&#9731;"/>
  <input id="Email" name="Email" type="email" placeholder="Email">
  <input id="signIn" name="signIn" type="submit" value="Sign in">
</form>
<form><input name="other" value="ignored"></form>
</body></html>"#;

    #[test]
    fn test_harvest_form_fields() {
        let fields = harvest_form_fields(LOGIN_PAGE).unwrap();
        assert_eq!(fields.get("GALX").map(String::as_str), Some("abc123"));
        assert_eq!(fields.get("service").map(String::as_str), Some("ee"));
        assert_eq!(fields.get("signIn").map(String::as_str), Some("Sign in"));
        // Inputs without a value attribute are not harvested
        assert!(!fields.contains_key("Email"));
        // Only the first form counts
        assert!(!fields.contains_key("other"));
    }

    #[test]
    fn test_harvest_without_form() {
        let fields = harvest_form_fields("<html><p>maintenance</p></html>").unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_continue_target_double_decoding() {
        let header = "realm%3Dx%26args%3Dcontinue%253Dhttps%253A%252F%252Fcode.example%252F";
        assert_eq!(continue_target(header), "https://code.example/");
    }

    #[test]
    fn test_continue_target_without_marker() {
        assert_eq!(continue_target("plain"), "plain");
    }

    #[test]
    fn test_check_login_response() {
        let login = Url::parse("https://accounts.example/ServiceLoginAuth").unwrap();
        let landing = Url::parse("https://code.example/").unwrap();

        assert!(matches!(
            check_login_response(&login, &login, "", &[]),
            Err(Error::Authentication { .. })
        ));
        assert!(check_login_response(&login, &landing, "<html>", &[]).is_ok());

        let markers = vec!["Earth Engine Code Editor".to_string()];
        assert!(check_login_response(&login, &landing, "<title>Sign in</title>", &markers).is_err());
        assert!(
            check_login_response(&login, &landing, "<title>Earth Engine Code Editor</title>", &markers)
                .is_ok()
        );
    }

    #[test]
    fn test_parse_upload_url() {
        assert_eq!(
            parse_upload_url(r#"{"url": "https://upload.example/x?id=1"}"#).unwrap(),
            "https://upload.example/x?id=1"
        );
        assert_eq!(
            parse_upload_url("{'url': 'https://upload.example/y'}").unwrap(),
            "https://upload.example/y"
        );
        let err = parse_upload_url("\n<!DOCTYPE html><html></html>").unwrap_err();
        assert!(err.contains("HTML"));
        assert!(parse_upload_url("{}").is_err());
    }

    #[test]
    fn test_parse_gsid() {
        assert_eq!(
            parse_gsid(r#"["gs://bucket/obj-1", "ignored"]"#).unwrap(),
            "gs://bucket/obj-1"
        );
        assert!(parse_gsid("[]").is_err());
        assert!(parse_gsid("not json").is_err());
    }

    #[test]
    fn test_auth_session_keeps_settings() {
        let settings = LoginSettings::default();
        let auth = AuthSession::new(settings.clone()).with_timeout(Some(Duration::from_secs(30)));
        assert_eq!(auth.settings, settings);
        assert_eq!(auth.timeout, Some(Duration::from_secs(30)));
    }
}
