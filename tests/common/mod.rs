#![allow(dead_code)]

use async_trait::async_trait;
use lfg_connect::core::errors::ExchangeError;
use lfg_connect::core::kernel::RestClient;
use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One request seen by [`MockRest`]
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub signed: bool,
}

impl Call {
    /// `"POST /exchange order"`, `"POST /info meta"` or `"DELETE /fapi/v1/order"`
    pub fn route(&self) -> String {
        let tag = self.body.as_ref().and_then(|body| {
            body.pointer("/action/type")
                .or_else(|| body.get("type"))
                .and_then(Value::as_str)
        });
        match tag {
            Some(tag) => format!("{} {} {}", self.method, self.endpoint, tag),
            None => format!("{} {}", self.method, self.endpoint),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

enum Reply {
    Json(Value),
    Status(String),
}

#[derive(Default)]
struct State {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<Call>,
}

/// Scripted [`RestClient`]: replies are queued per route and consumed in order.
#[derive(Clone, Default)]
pub struct MockRest {
    state: Arc<Mutex<State>>,
}

impl MockRest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, route: &str, body: Value) -> &Self {
        self.push(route, Reply::Json(body))
    }

    /// Non-200 answer carrying `body`
    pub fn reply_status(&self, route: &str, body: &str) -> &Self {
        self.push(route, Reply::Status(body.to_string()))
    }

    fn push(&self, route: &str, reply: Reply) -> &Self {
        self.state
            .lock()
            .replies
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, route: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.route() == route)
            .collect()
    }

    fn answer<T: DeserializeOwned>(&self, call: Call) -> Result<T, ExchangeError> {
        let route = call.route();
        let mut state = self.state.lock();
        state.calls.push(call);
        let reply = state
            .replies
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ExchangeError::Other(format!("no scripted reply for {}", route)))?;
        drop(state);

        match reply {
            Reply::Json(body) => Ok(serde_json::from_value(body)?),
            Reply::Status(body) => Err(ExchangeError::BadStatus {
                status: "400 Bad Request".to_string(),
                body,
            }),
        }
    }
}

fn owned(params: &[(&str, &str)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[async_trait]
impl RestClient for MockRest {
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        self.answer(Call {
            method: Method::GET,
            endpoint: endpoint.to_string(),
            params: owned(query_params),
            body: None,
            signed: authenticated,
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        self.answer(Call {
            method: Method::POST,
            endpoint: endpoint.to_string(),
            params: vec![],
            body: Some(body.clone()),
            signed: authenticated,
        })
    }

    async fn signed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        self.answer(Call {
            method,
            endpoint: endpoint.to_string(),
            params: owned(query_params),
            body: None,
            signed: true,
        })
    }

    async fn keyed_request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ExchangeError> {
        self.answer(Call {
            method,
            endpoint: endpoint.to_string(),
            params: owned(query_params),
            body: None,
            signed: false,
        })
    }
}
