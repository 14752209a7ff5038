//! HTTP client for the KUMO `/config` endpoint.
//!
//! Every call maps transport failures, non-success statuses and unexpected JSON
//! shapes into [`DeviceError`]; the session engine treats all of them alike.

use core::time::Duration;

use kumo_common::{ConfigEvent, ConnectResponse, ParamId, ParamResponse, ParamValue, Request};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error as ThisError;
use tracing::debug;

/// Errors talking to the router.
#[derive(Debug, ThisError)]
pub enum DeviceError {
    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("Invalid router address {address:?}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Request {action} to the router failed")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Router answered {status} to {action}")]
    Status {
        action: &'static str,
        status: StatusCode,
    },
    #[error("Malformed {action} response from the router")]
    Malformed {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected value {value} for {param}")]
    UnexpectedValue { param: ParamId, value: ParamValue },
}

/// Client bound to one router address.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl DeviceClient {
    /// Build a client for `address` (`host` or `host:port`) on top of a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not form a valid URL.
    pub fn new(http: reqwest::Client, address: &str) -> Result<Self, DeviceError> {
        let endpoint = Url::parse(&format!("http://{}/config", address.trim())).map_err(
            |source| DeviceError::InvalidAddress {
                address: address.to_owned(),
                source,
            },
        )?;
        Ok(Self { http, endpoint })
    }

    fn url_for(&self, request: &Request) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(request.query_pairs());
        url
    }

    async fn send(&self, request: &Request, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        let action = request.action().as_str();
        let url = self.url_for(request);
        debug!(%url, "Router request");

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| DeviceError::Transport { action, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status { action, status });
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| DeviceError::Transport { action, source })?;
        Ok(body.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<T, DeviceError> {
        let body = self.send(request, timeout).await?;
        serde_json::from_slice(&body).map_err(|source| DeviceError::Malformed {
            action: request.action().as_str(),
            source,
        })
    }

    /// Open a session and return the connection id.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, non-success status or malformed body.
    pub async fn connect(&self, timeout: Duration) -> Result<String, DeviceError> {
        let response: ConnectResponse = self.send_json(&Request::Connect, timeout).await?;
        Ok(response.connectionid)
    }

    /// Read a single parameter.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, non-success status or malformed body.
    pub async fn get(&self, param: ParamId, timeout: Duration) -> Result<ParamValue, DeviceError> {
        let response: ParamResponse = self.send_json(&Request::Get(param), timeout).await?;
        Ok(response.value)
    }

    /// Write a single parameter. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout or non-success status.
    pub async fn set(
        &self,
        param: ParamId,
        value: u32,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        let request = Request::Set {
            param,
            value: value.to_string(),
        };
        self.send(&request, timeout).await?;
        Ok(())
    }

    /// Block until the router reports parameter changes for `connection_id`
    /// or its hold time elapses.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, non-success status or malformed body.
    pub async fn wait_for_events(
        &self,
        connection_id: &str,
        timeout: Duration,
    ) -> Result<Vec<ConfigEvent>, DeviceError> {
        let request = Request::WaitForConfigEvents {
            connection_id: connection_id.to_owned(),
        };
        self.send_json(&request, timeout).await
    }
}
