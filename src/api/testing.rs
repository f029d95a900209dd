use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::api::{ApiRequest, HttpCaller};
use crate::config::Secret;
use crate::error::{AppError, Result};

type CallHook = Box<dyn Fn(&ApiRequest) + Send + Sync>;

/// Replays canned responses in order and records every request it sees.
pub struct ScriptedCaller {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(ApiRequest, Instant)>>,
    on_call: Option<CallHook>,
}

impl ScriptedCaller {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            on_call: None,
        }
    }

    /// Run `hook` for every request before answering it.
    pub fn with_hook(mut self, hook: impl Fn(&ApiRequest) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl HttpCaller for ScriptedCaller {
    async fn call(&self, request: &ApiRequest, _api_key: &Secret) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));

        if let Some(hook) = &self.on_call {
            hook(request);
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::EmptyResponse(request.url.clone())))
    }
}
