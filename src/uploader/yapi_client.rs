use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::model::{ApiDefinition, ApiParameter};

use super::upload_batch::{UploadTarget, UploadedInterface};

/// Errcode Yapi answers with when the session is missing or expired.
const ERRCODE_NEED_LOGIN: i64 = 40011;
/// Token lifetime Yapi grants a fresh login when the server does not say.
const DEFAULT_COOKIE_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;
const HTTP_TIMEOUT_SECS: u64 = 120;
const LIST_PAGE_LIMIT: u32 = 1000;

/// Category used for definitions that do not carry one.
pub const DEFAULT_CATEGORY: &str = "api";

/// Session cookies plus the epoch millis at which they expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCookies {
    pub cookies: String,
    pub ttl: i64,
}

/// Outcome of the credential check run before any batch.
#[derive(Debug)]
pub enum ConnectionTest {
    Ok,
    AuthFailed(String),
    NetworkError(String),
}

/// Every Yapi response wraps its data in this envelope.
#[derive(Debug, Deserialize)]
struct YapiEnvelope<T> {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YapiCategory {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSummary {
    #[serde(rename = "_id")]
    pub id: i64,
    pub method: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct InterfacePage {
    #[serde(default)]
    list: Vec<InterfaceSummary>,
}

#[derive(Debug, Deserialize)]
struct SavedInterface {
    #[serde(rename = "_id")]
    id: i64,
}

/// Interface body for `/api/interface/add` and `/api/interface/up`.
/// Yapi expects parameter `required` flags as the strings "1"/"0".
#[derive(Debug, Serialize)]
pub struct InterfacePayload {
    pub title: String,
    pub path: String,
    pub method: String,
    pub catid: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    pub req_params: Vec<PayloadParam>,
    pub req_query: Vec<PayloadParam>,
    pub req_headers: Vec<PayloadParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_body_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_body_other: Option<String>,
    pub res_body_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayloadParam {
    pub name: String,
    pub required: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl From<&ApiParameter> for PayloadParam {
    fn from(parameter: &ApiParameter) -> Self {
        Self {
            name: parameter.name.clone(),
            required: (if parameter.required { "1" } else { "0" }).to_string(),
            desc: parameter.description.clone(),
            example: parameter.example.clone(),
        }
    }
}

impl InterfacePayload {
    pub fn from_definition(
        project_id: i64,
        catid: i64,
        existing_id: Option<i64>,
        api: &ApiDefinition,
    ) -> AppResult<Self> {
        let req_body_other = match &api.request_body {
            Some(body) => Some(serde_json::to_string_pretty(body)?),
            None => None,
        };
        let res_body = match &api.response_body {
            Some(body) => Some(serde_json::to_string_pretty(body)?),
            None => None,
        };

        Ok(Self {
            title: api.title.clone(),
            path: api.path.clone(),
            method: api.method.as_str().to_string(),
            catid,
            project_id,
            id: existing_id,
            status: (if api.done { "done" } else { "undone" }).to_string(),
            markdown: api.description.clone(),
            req_params: api.path_params.iter().map(PayloadParam::from).collect(),
            req_query: api.query_params.iter().map(PayloadParam::from).collect(),
            req_headers: api.headers.iter().map(PayloadParam::from).collect(),
            req_body_type: api.request_body_type.clone(),
            req_body_other,
            res_body_type: "json".to_string(),
            res_body,
        })
    }
}

#[derive(Debug, Default)]
struct SessionState {
    cookies: Option<String>,
    valid_until: Option<i64>,
}

/// Yapi HTTP client with a cached login session.
pub struct YapiClient {
    base_url: String,
    account: String,
    password: String,
    http: Client,
    session: Mutex<SessionState>,
}

impl YapiClient {
    pub fn new(
        url: &str,
        account: &str,
        password: &str,
        cookies: Option<String>,
        cookies_ttl: Option<i64>,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            account: account.to_string(),
            password: password.to_string(),
            http,
            session: Mutex::new(SessionState {
                cookies,
                valid_until: cookies_ttl,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // A poisoned lock still holds usable cookie state.
    fn session_lock(&self) -> MutexGuard<'_, SessionState> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached_cookie_header(&self) -> Option<String> {
        let session = self.session_lock();
        let cookies = session.cookies.as_ref()?;
        let valid_until = session.valid_until?;
        if valid_until <= Utc::now().timestamp_millis() {
            return None;
        }
        Some(cookies.clone())
    }

    /// Cached session cookies, exported after a batch so they can be
    /// persisted. No network call involved.
    pub fn auth_cookies(&self) -> Option<AuthCookies> {
        let session = self.session_lock();
        match (&session.cookies, session.valid_until) {
            (Some(cookies), Some(ttl)) => Some(AuthCookies {
                cookies: cookies.clone(),
                ttl,
            }),
            _ => None,
        }
    }

    async fn login(&self) -> AppResult<()> {
        let url = format!("{}/api/user/login", self.base_url);
        let body = serde_json::json!({
            "email": self.account,
            "password": self.password,
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::upload_failed(format!(
                "Yapi login returned {}: {}",
                status, text
            )));
        }

        let mut pairs = Vec::new();
        let mut ttl_ms = None;
        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                if let Some((pair, cookie_ttl)) = parse_set_cookie(raw) {
                    pairs.push(pair);
                    if cookie_ttl.is_some() {
                        ttl_ms = cookie_ttl;
                    }
                }
            }
        }

        let envelope: YapiEnvelope<serde_json::Value> = response.json().await?;
        if envelope.errcode != 0 {
            return Err(AppError::auth(envelope.errmsg));
        }
        if pairs.is_empty() {
            return Err(AppError::auth("login response carried no session cookies"));
        }

        let valid_until = Utc::now().timestamp_millis() + ttl_ms.unwrap_or(DEFAULT_COOKIE_TTL_MS);
        let mut session = self.session_lock();
        session.cookies = Some(pairs.join("; "));
        session.valid_until = Some(valid_until);

        log::info!("Logged in to {} as {}", self.base_url, self.account);
        Ok(())
    }

    async fn ensure_login(&self) -> AppResult<()> {
        if self.cached_cookie_header().is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Fresh login classified for the precondition check.
    pub async fn test_connection(&self) -> ConnectionTest {
        match self.login().await {
            Ok(()) => ConnectionTest::Ok,
            Err(AppError::Auth { reason }) => ConnectionTest::AuthFailed(reason),
            Err(other) => ConnectionTest::NetworkError(other.to_string()),
        }
    }

    /// Send one enveloped request. A 40011 envelope refreshes the session
    /// once and replays the request; any other nonzero errcode is an error.
    async fn call_envelope<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AppResult<YapiEnvelope<T>> {
        self.ensure_login().await?;

        let url = format!("{}{}", self.base_url, path);
        let mut refreshed = false;
        loop {
            let cookies = self
                .cached_cookie_header()
                .ok_or_else(|| AppError::auth("no session cookies after login"))?;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(header::COOKIE, cookies);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AppError::upload_failed(format!(
                    "Yapi server returned {} for {}: {}",
                    status, path, text
                )));
            }

            let envelope: YapiEnvelope<T> = response.json().await?;
            match envelope.errcode {
                0 => return Ok(envelope),
                ERRCODE_NEED_LOGIN if !refreshed => {
                    // Stale cookies; refresh the session once and replay.
                    log::warn!("Session expired for {}, logging in again", self.base_url);
                    self.login().await?;
                    refreshed = true;
                }
                errcode => return Err(AppError::api(errcode, envelope.errmsg)),
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AppResult<T> {
        let envelope = self.call_envelope(method, path, body).await?;
        envelope.data.ok_or_else(|| {
            AppError::upload_failed(format!("Yapi response for {} carried no data", path))
        })
    }

    pub async fn categories(&self, project_id: i64) -> AppResult<Vec<YapiCategory>> {
        self.call(
            Method::GET,
            &format!("/api/interface/getCatMenu?project_id={}", project_id),
            None,
        )
        .await
    }

    pub async fn add_category(&self, project_id: i64, name: &str) -> AppResult<YapiCategory> {
        let body = serde_json::json!({
            "project_id": project_id,
            "name": name,
            "desc": "",
        });
        self.call(Method::POST, "/api/interface/add_cat", Some(&body))
            .await
    }

    pub async fn category_interfaces(&self, cat_id: i64) -> AppResult<Vec<InterfaceSummary>> {
        let page: InterfacePage = self
            .call(
                Method::GET,
                &format!(
                    "/api/interface/list_cat?catid={}&page=1&limit={}",
                    cat_id, LIST_PAGE_LIMIT
                ),
                None,
            )
            .await?;
        Ok(page.list)
    }

    pub async fn add_interface(&self, payload: &InterfacePayload) -> AppResult<i64> {
        let body = serde_json::to_value(payload)?;
        let saved: SavedInterface = self
            .call(Method::POST, "/api/interface/add", Some(&body))
            .await?;
        Ok(saved.id)
    }

    pub async fn update_interface(&self, payload: &InterfacePayload) -> AppResult<()> {
        let body = serde_json::to_value(payload)?;
        let _: YapiEnvelope<serde_json::Value> = self
            .call_envelope(Method::POST, "/api/interface/up", Some(&body))
            .await?;
        Ok(())
    }

    pub fn category_url(&self, project_id: i64, cat_id: i64) -> String {
        format!(
            "{}/project/{}/interface/api/cat_{}",
            self.base_url, project_id, cat_id
        )
    }

    pub fn interface_url(&self, project_id: i64, interface_id: i64) -> String {
        format!(
            "{}/project/{}/interface/api/{}",
            self.base_url, project_id, interface_id
        )
    }
}

/// Split one Set-Cookie header into its `name=value` pair and, when the
/// attributes carry one, a lifetime in millis.
fn parse_set_cookie(raw: &str) -> Option<(String, Option<i64>)> {
    let mut parts = raw.split(';');
    let pair = parts.next()?.trim();
    if pair.is_empty() || !pair.contains('=') {
        return None;
    }

    let mut ttl_ms = None;
    for attribute in parts {
        let attribute = attribute.trim();
        if let Some(value) = strip_attr(attribute, "max-age") {
            if let Ok(seconds) = value.trim().parse::<i64>() {
                ttl_ms = Some(seconds * 1000);
            }
        } else if let Some(value) = strip_attr(attribute, "expires") {
            if let Ok(expires) = DateTime::parse_from_rfc2822(value.trim()) {
                let remaining = expires.timestamp_millis() - Utc::now().timestamp_millis();
                if remaining > 0 {
                    ttl_ms = Some(remaining);
                }
            }
        }
    }

    Some((pair.to_string(), ttl_ms))
}

fn strip_attr<'a>(attribute: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = attribute.split_once('=')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value)
    } else {
        None
    }
}

/// Upload facade over [`YapiClient`]: resolves categories once per batch
/// and turns each definition into a create-or-update call.
pub struct YapiUploader {
    client: YapiClient,
    categories: Mutex<HashMap<(i64, String), i64>>,
}

impl YapiUploader {
    pub fn new(client: YapiClient) -> Self {
        Self {
            client,
            categories: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &YapiClient {
        &self.client
    }

    fn cached_category(&self, project_id: i64, name: &str) -> Option<i64> {
        self.categories
            .lock()
            .ok()
            .and_then(|cache| cache.get(&(project_id, name.to_string())).copied())
    }

    fn remember_category(&self, project_id: i64, name: &str, id: i64) {
        if let Ok(mut cache) = self.categories.lock() {
            cache.insert((project_id, name.to_string()), id);
        }
    }

    async fn category_id(&self, project_id: i64, name: &str) -> AppResult<i64> {
        if let Some(id) = self.cached_category(project_id, name) {
            return Ok(id);
        }

        let menu = self.client.categories(project_id).await?;
        for category in &menu {
            self.remember_category(project_id, &category.name, category.id);
        }

        if let Some(found) = menu.into_iter().find(|category| category.name == name) {
            return Ok(found.id);
        }

        let created = self.client.add_category(project_id, name).await?;
        log::info!("Created category '{}' ({})", name, created.id);
        self.remember_category(project_id, name, created.id);
        Ok(created.id)
    }
}

#[async_trait]
impl UploadTarget for YapiUploader {
    async fn upload(
        &self,
        project_id: i64,
        api: &ApiDefinition,
    ) -> AppResult<UploadedInterface> {
        let category = api.category.as_deref().unwrap_or(DEFAULT_CATEGORY);
        let catid = self.category_id(project_id, category).await?;

        let existing = self
            .client
            .category_interfaces(catid)
            .await?
            .into_iter()
            .find(|summary| {
                summary.path == api.path
                    && summary.method.eq_ignore_ascii_case(api.method.as_str())
            });

        let existing_id = existing.as_ref().map(|summary| summary.id);
        let payload = InterfacePayload::from_definition(project_id, catid, existing_id, api)?;

        let interface_id = match existing {
            Some(found) => {
                self.client.update_interface(&payload).await?;
                found.id
            }
            None => self.client.add_interface(&payload).await?,
        };

        Ok(UploadedInterface {
            project_id,
            category_id: catid,
            interface_id,
        })
    }

    fn interface_url(&self, project_id: i64, interface_id: i64) -> String {
        self.client.interface_url(project_id, interface_id)
    }

    fn category_url(&self, project_id: i64, category_id: i64) -> String {
        self.client.category_url(project_id, category_id)
    }

    fn auth_cookies(&self) -> Option<AuthCookies> {
        self.client.auth_cookies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HttpMethod;

    fn test_client(cookies: Option<String>, ttl: Option<i64>) -> YapiClient {
        YapiClient::new(
            "https://yapi.example.com/",
            "dev@example.com",
            "secret",
            cookies,
            ttl,
        )
        .expect("client")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = test_client(None, None);
        assert_eq!(client.base_url(), "https://yapi.example.com");
    }

    #[test]
    fn test_link_construction() {
        let client = test_client(None, None);
        assert_eq!(
            client.category_url(42, 7),
            "https://yapi.example.com/project/42/interface/api/cat_7"
        );
        assert_eq!(
            client.interface_url(42, 99),
            "https://yapi.example.com/project/42/interface/api/99"
        );
    }

    #[test]
    fn test_cached_cookie_header_honours_ttl() {
        let future = Utc::now().timestamp_millis() + 60_000;
        let client = test_client(Some("_yapi_token=abc".to_string()), Some(future));
        assert_eq!(
            client.cached_cookie_header().as_deref(),
            Some("_yapi_token=abc")
        );

        let past = Utc::now().timestamp_millis() - 1;
        let client = test_client(Some("_yapi_token=abc".to_string()), Some(past));
        assert!(client.cached_cookie_header().is_none());

        // Expired cookies are still exported for persistence
        assert!(client.auth_cookies().is_some());
    }

    #[test]
    fn test_parse_set_cookie_max_age() {
        let (pair, ttl) =
            parse_set_cookie("_yapi_token=abc123; path=/; Max-Age=604800; httponly").expect("pair");
        assert_eq!(pair, "_yapi_token=abc123");
        assert_eq!(ttl, Some(604_800_000));
    }

    #[test]
    fn test_parse_set_cookie_expires() {
        let expires = (Utc::now() + chrono::Duration::days(7)).to_rfc2822();
        let raw = format!("_yapi_uid=42; path=/; expires={}", expires);
        let (pair, ttl) = parse_set_cookie(&raw).expect("pair");
        assert_eq!(pair, "_yapi_uid=42");
        let ttl = ttl.expect("ttl from expires");
        assert!(ttl > 6 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(parse_set_cookie("; path=/").is_none());
        assert!(parse_set_cookie("no-equals-sign").is_none());
    }

    #[test]
    fn test_envelope_decoding() {
        let raw = r#"{"errcode": 0, "errmsg": "success", "data": [{"_id": 7, "name": "pets"}]}"#;
        let envelope: YapiEnvelope<Vec<YapiCategory>> =
            serde_json::from_str(raw).expect("decode");
        assert_eq!(envelope.errcode, 0);
        let data = envelope.data.expect("data");
        assert_eq!(data[0].id, 7);
        assert_eq!(data[0].name, "pets");

        let raw = r#"{"errcode": 40011, "errmsg": "please login"}"#;
        let envelope: YapiEnvelope<Vec<YapiCategory>> =
            serde_json::from_str(raw).expect("decode");
        assert_eq!(envelope.errcode, ERRCODE_NEED_LOGIN);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_payload_from_definition() {
        let api = ApiDefinition {
            title: "Create pet".to_string(),
            method: HttpMethod::Post,
            path: "/pets".to_string(),
            category: Some("pets".to_string()),
            description: Some("Adds a pet".to_string()),
            path_params: vec![],
            query_params: vec![ApiParameter {
                name: "dryRun".to_string(),
                required: false,
                description: None,
                example: None,
            }],
            headers: vec![ApiParameter {
                name: "X-Request-Id".to_string(),
                required: true,
                description: None,
                example: Some("abc".to_string()),
            }],
            request_body_type: Some("json".to_string()),
            request_body: Some(serde_json::json!({"type": "object"})),
            response_body: Some(serde_json::json!({"code": 0})),
            done: false,
        };

        let payload = InterfacePayload::from_definition(42, 7, Some(99), &api).expect("payload");
        assert_eq!(payload.method, "POST");
        assert_eq!(payload.catid, 7);
        assert_eq!(payload.project_id, 42);
        assert_eq!(payload.id, Some(99));
        assert_eq!(payload.status, "undone");
        assert_eq!(payload.req_query[0].required, "0");
        assert_eq!(payload.req_headers[0].required, "1");
        assert!(payload.req_body_other.as_deref().unwrap().contains("object"));
        assert!(payload.res_body.as_deref().unwrap().contains("\"code\": 0"));

        let body = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["id"], 99);
        assert_eq!(body["res_body_type"], "json");
    }
}
