//! InfluxDB 1.x HTTP client.

use super::{EventStore, QueryResponse};
use crate::config::StoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Event store backed by the InfluxDB HTTP API.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
    timeout: Duration,
}

impl InfluxClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.url).map_err(|_| StoreError::InvalidUrl {
            url: config.url.clone(),
        })?;
        let timeout = config.query_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|e| StoreError::Unreachable {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
        })
    }

    /// Check the server is up and make sure `database` exists.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Self::new(config)?;
        client.ping().await?;
        client.create_database(&config.database).await?;
        info!(url = %client.base_url, database = %config.database, "Connected to InfluxDB");
        Ok(client)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let url = self.endpoint("ping")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            return Err(StoreError::Unreachable {
                message: format!("ping returned HTTP {}", response.status()),
            });
        }
        debug!(url = %self.base_url, "InfluxDB ping ok");
        Ok(())
    }

    /// Issue `CREATE DATABASE`, which InfluxDB treats as a no-op when it exists.
    pub async fn create_database(&self, database: &str) -> Result<(), StoreError> {
        let statement = format!("CREATE DATABASE \"{}\"", database.replace('"', "\\\""));
        let response = self.query(&statement, None).await?;
        if let Some(message) = response.error.or_else(|| {
            response
                .results
                .into_iter()
                .find_map(|result| result.error)
        }) {
            return Err(StoreError::QueryRejected { message });
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|_| StoreError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
            })
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else if err.is_connect() {
            StoreError::Unreachable {
                message: err.to_string(),
            }
        } else {
            StoreError::InvalidResponse {
                message: err.to_string(),
            }
        }
    }

    async fn query(&self, query: &str, database: Option<&str>) -> Result<QueryResponse, StoreError> {
        let url = self.endpoint("query")?;
        let mut params = vec![("q", query)];
        if let Some(db) = database {
            params.push(("db", db));
        }

        let mut request = self.client.post(url).query(&params);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<QueryResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP {status}: {body}"));
            return Err(StoreError::QueryRejected { message });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl EventStore for InfluxClient {
    async fn execute_query(
        &self,
        query: &str,
        database: &str,
    ) -> Result<QueryResponse, StoreError> {
        debug!(query, database, "Executing InfluxDB query");
        let response = self.query(query, Some(database)).await?;
        if let Some(message) = response.error {
            return Err(StoreError::QueryRejected { message });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = StoreConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        let err = InfluxClient::new(&config).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl { url } if url == "not a url"));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = InfluxClient::new(&StoreConfig::default()).unwrap();
        assert_eq!(
            client.endpoint("query").unwrap().as_str(),
            "http://influxdb:8086/query"
        );
        assert_eq!(
            client.endpoint("ping").unwrap().as_str(),
            "http://influxdb:8086/ping"
        );
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let config = StoreConfig {
            url: "http://127.0.0.1:1".into(),
            query_timeout_secs: 2,
            ..Default::default()
        };
        let err = InfluxClient::connect(&config).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unreachable { .. } | StoreError::Timeout { .. }
        ));
    }
}
