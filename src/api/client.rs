use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

use crate::api::{ApiRequest, HttpCaller, Method, RequestBody};
use crate::config::Secret;
use crate::error::{AppError, Result};

const API_KEY_HEADER: &str = "x-api";

pub struct ReqwestCaller {
    client: Client,
}

impl ReqwestCaller {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpCaller for ReqwestCaller {
    async fn call(&self, request: &ApiRequest, api_key: &Secret) -> Result<String> {
        let url = Url::parse(&request.url)
            .map_err(|e| AppError::MalformedEndpoint(format!("{}: {e}", request.url)))?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        }
        .header(API_KEY_HEADER, api_key.expose());

        if request.method == Method::Post {
            builder = match &request.body {
                Some(RequestBody::Json(value)) => builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(value.to_string()),
                Some(RequestBody::Form(form)) => builder
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(form.clone()),
                None => builder,
            };
        }

        tracing::debug!(method = ?request.method, url = %request.url, "Calling DiveCloud API");

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ApiStatus {
                url: request.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        if body.is_empty() {
            return Err(AppError::EmptyResponse(request.url.clone()));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn caller() -> ReqwestCaller {
        ReqwestCaller::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_api_key_and_form_content_type() {
        let app = Router::new().route(
            "/run",
            post(|headers: HeaderMap, body: String| async move {
                let key = headers.get("x-api").and_then(|v| v.to_str().ok()).unwrap_or("");
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                format!("{key}|{content_type}|{body}")
            }),
        );
        let base = serve(app).await;

        let request = ApiRequest::post(
            format!("{base}/run"),
            RequestBody::Form("creds_pass=abc".to_string()),
        );
        let body = caller().call(&request, &Secret::new("k-1")).await.unwrap();

        assert_eq!(body, "k-1|application/x-www-form-urlencoded|creds_pass=abc");
    }

    #[tokio::test]
    async fn test_json_body_uses_json_content_type() {
        let app = Router::new().route(
            "/hooks",
            post(|headers: HeaderMap| async move {
                headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            }),
        );
        let base = serve(app).await;

        let request = ApiRequest::post(
            format!("{base}/hooks"),
            RequestBody::Json(serde_json::json!({"event": "run_plan"})),
        );
        let body = caller().call(&request, &Secret::new("k")).await.unwrap();
        assert_eq!(body, "application/json");
    }

    #[tokio::test]
    async fn test_empty_success_body_is_a_failure() {
        let app = Router::new().route("/empty", get(|| async { "" }));
        let base = serve(app).await;

        let err = caller()
            .call(&ApiRequest::get(format!("{base}/empty")), &Secret::new("k"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResponse);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/denied",
            get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;

        let err = caller()
            .call(&ApiRequest::get(format!("{base}/denied")), &Secret::new("k"))
            .await
            .unwrap_err();
        match err {
            AppError::ApiStatus { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_url_is_malformed_endpoint() {
        let err = caller()
            .call(&ApiRequest::get("not a url"), &Secret::new("k"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEndpoint);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind and drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = caller()
            .call(
                &ApiRequest::get(format!("http://127.0.0.1:{port}/x")),
                &Secret::new("k"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }
}
