//! Newline-delimited JSON protocol for talking to task servers.
//!
//! Each call is one connection: the client writes a single request line,
//! reads a single response line, and closes. Request and response carry an
//! id so a mismatched reply is detected rather than silently accepted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::bridge::{TaskSource, TaskUpdate};
use crate::error::{PalaverError, Result};

/// One request line.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// One response line. Exactly one of `result` and `error` is present.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

/// Error payload reported by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Client for one task server address.
#[derive(Debug, Clone)]
pub struct LineClient {
    address: String,
}

impl LineClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }

    /// Issue one call and return the server's result value.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let request = WireRequest {
            id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let stream = TcpStream::connect(&self.address).await?;
        let mut stream = BufReader::new(stream);
        stream.get_mut().write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        let read = stream.read_line(&mut reply).await?;
        if read == 0 {
            return Err(PalaverError::Protocol(format!(
                "server {} closed the connection without replying",
                self.address
            )));
        }

        let response: WireResponse = serde_json::from_str(reply.trim_end()).map_err(|err| {
            PalaverError::Protocol(format!("malformed response from {}: {err}", self.address))
        })?;
        if response.id != request.id {
            return Err(PalaverError::Protocol(format!(
                "response id {:?} does not match request id {:?}",
                response.id, request.id
            )));
        }
        if let Some(error) = response.error {
            return Err(PalaverError::Backend(format!(
                "{method} on {} failed: {error}",
                self.address
            )));
        }
        response.result.ok_or_else(|| {
            PalaverError::Protocol(format!(
                "response from {} carried neither result nor error",
                self.address
            ))
        })
    }
}

/// Routes task operations to named servers over the line protocol.
pub struct RemoteTaskSource {
    servers: HashMap<String, LineClient>,
}

impl RemoteTaskSource {
    pub fn new(servers: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            servers: servers
                .into_iter()
                .map(|(name, address)| (name, LineClient::new(address)))
                .collect(),
        }
    }

    pub fn into_shared(self) -> Arc<dyn TaskSource> {
        Arc::new(self)
    }

    fn client(&self, server: &str) -> Result<&LineClient> {
        self.servers.get(server).ok_or_else(|| {
            PalaverError::Configuration(format!("no task server configured under {server:?}"))
        })
    }
}

#[async_trait]
impl TaskSource for RemoteTaskSource {
    async fn start(
        &self,
        server: &str,
        skill: &str,
        payload: &serde_json::Value,
    ) -> Result<String> {
        let result = self
            .client(server)?
            .call(
                "task.start",
                serde_json::json!({ "skill": skill, "payload": payload }),
            )
            .await?;
        result
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PalaverError::Protocol(format!("task.start on {server:?} returned no task_id"))
            })
    }

    async fn poll(&self, server: &str, remote_ref: &str) -> Result<TaskUpdate> {
        let result = self
            .client(server)?
            .call("task.poll", serde_json::json!({ "task_id": remote_ref }))
            .await?;
        serde_json::from_value(result).map_err(|err| {
            PalaverError::Protocol(format!("task.poll on {server:?} returned a bad update: {err}"))
        })
    }

    async fn send(&self, server: &str, remote_ref: &str, message: &str) -> Result<()> {
        self.client(server)?
            .call(
                "task.send",
                serde_json::json!({ "task_id": remote_ref, "message": message }),
            )
            .await?;
        Ok(())
    }

    async fn cancel(&self, server: &str, remote_ref: &str) -> Result<()> {
        self.client(server)?
            .call("task.cancel", serde_json::json!({ "task_id": remote_ref }))
            .await?;
        Ok(())
    }
}
