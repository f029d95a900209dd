pub mod client;
pub mod parser;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::Secret;
use crate::error::Result;

pub use client::ReqwestCaller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    /// Already url-encoded `key=value` pairs.
    Form(String),
}

// Form bodies carry the credential passphrase
impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Form(_) => f.debug_tuple("Form").field(&"[REDACTED]").finish(),
        }
    }
}

/// A single call against the DiveCloud API. Only POST requests carry a body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Issues one HTTP request and returns the response body. No retries.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    async fn call(&self, request: &ApiRequest, api_key: &Secret) -> Result<String>;
}

/// The three DiveCloud endpoints a plan run touches.
#[derive(Clone)]
pub struct DiveCloudApi {
    caller: Arc<dyn HttpCaller>,
    base_url: String,
    api_key: Secret,
}

impl DiveCloudApi {
    pub fn new(caller: Arc<dyn HttpCaller>, base_url: &str, api_key: Secret) -> Self {
        Self {
            caller,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn hooks_url(&self) -> String {
        format!("{}/hooks", self.base_url)
    }

    pub fn trigger_url(&self, plan_id: &str) -> String {
        format!("{}/plans/{}/run", self.base_url, urlencoding::encode(plan_id))
    }

    pub fn test_instance_url(&self, test_id: &str) -> String {
        format!("{}/test_instances/{}", self.base_url, urlencoding::encode(test_id))
    }

    /// Register `callback_url` to be notified when `plan_id` finishes running.
    pub async fn register_hook(&self, plan_id: &str, callback_url: &str) -> Result<String> {
        let body = json!({
            "event": "run_plan",
            "resource_id": plan_id,
            "url": callback_url,
        });
        let request = ApiRequest::post(self.hooks_url(), RequestBody::Json(body));
        self.caller.call(&request, &self.api_key).await
    }

    /// Start a run of `plan_id`. The response carries the `test_id`.
    pub async fn trigger_plan(&self, plan_id: &str, creds_pass: &Secret) -> Result<String> {
        let form = format!("creds_pass={}", urlencoding::encode(creds_pass.expose()));
        let request = ApiRequest::post(self.trigger_url(plan_id), RequestBody::Form(form));
        self.caller.call(&request, &self.api_key).await
    }

    pub async fn test_instance(&self, test_id: &str) -> Result<String> {
        let request = ApiRequest::get(self.test_instance_url(test_id));
        self.caller.call(&request, &self.api_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedCaller;

    fn api(caller: Arc<ScriptedCaller>) -> DiveCloudApi {
        DiveCloudApi::new(caller, "https://divecloud.test/api/v1/", Secret::new("key"))
    }

    #[tokio::test]
    async fn test_register_hook_posts_json_body() {
        let caller = Arc::new(ScriptedCaller::new(vec![Ok("{}".to_string())]));
        api(caller.clone())
            .register_hook("55", "http://ci.local:8080/cb")
            .await
            .unwrap();

        let requests = caller.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://divecloud.test/api/v1/hooks");
        match requests[0].body.as_ref() {
            Some(RequestBody::Json(body)) => {
                assert_eq!(body["event"], "run_plan");
                assert_eq!(body["resource_id"], "55");
                assert_eq!(body["url"], "http://ci.local:8080/cb");
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trigger_plan_form_encodes_secret() {
        let caller = Arc::new(ScriptedCaller::new(vec![Ok(r#"{"test_id":1}"#.to_string())]));
        api(caller.clone())
            .trigger_plan("55", &Secret::new("p&ss word"))
            .await
            .unwrap();

        let requests = caller.requests();
        assert_eq!(requests[0].url, "https://divecloud.test/api/v1/plans/55/run");
        match requests[0].body.as_ref() {
            Some(RequestBody::Form(form)) => assert_eq!(form, "creds_pass=p%26ss%20word"),
            other => panic!("expected form body, got {other:?}"),
        }
        assert!(!format!("{:?}", requests[0]).contains("p%26ss"));
    }

    #[tokio::test]
    async fn test_test_instance_is_a_bodyless_get() {
        let caller = Arc::new(ScriptedCaller::new(vec![Ok("{}".to_string())]));
        api(caller.clone()).test_instance("42").await.unwrap();

        let requests = caller.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, "https://divecloud.test/api/v1/test_instances/42");
        assert!(requests[0].body.is_none());
    }
}
