//! Async load-service traits and a concrete HTTP-backed implementation.
//!
//! Spec §6 treats tile fetching as an external collaborator reached only
//! through events; this module is the concrete collaborator this crate
//! ships so it is runnable out of the box, built the way the teacher's
//! `osm::cache::load_tile_image` builds its own fetch-with-retry loop, but
//! generalized from a single-purpose blocking `reqwest` call into an
//! `async_trait` over a shared client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

use crate::config::EndpointConfig;
use crate::error::LoadError;
use crate::tile_id::TileId;

/// Attempts a fetch is retried before giving up, mirroring the teacher's
/// own retry count for `load_tile_image`.
const MAX_ATTEMPTS: u32 = 2;

/// Delay between retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(200);

#[async_trait]
pub trait HeightTileLoadService: Send + Sync {
    async fn load(&self, id: TileId) -> Result<Bytes, LoadError>;
}

#[async_trait]
pub trait OrthoTileLoadService: Send + Sync {
    async fn load(&self, id: TileId) -> Result<Bytes, LoadError>;
}

/// A `reqwest`-backed load service parameterized by an [`EndpointConfig`].
/// One instance serves either height or ortho tiles, depending on which
/// endpoint it is constructed with; [`HttpTileLoadService::for_height`] and
/// [`HttpTileLoadService::for_ortho`] wire it into the respective trait.
pub struct HttpTileLoadService {
    client: Client,
    endpoint: EndpointConfig,
}

impl HttpTileLoadService {
    pub fn new(client: Client, endpoint: EndpointConfig) -> Self {
        Self { client, endpoint }
    }

    async fn fetch(&self, id: TileId) -> Result<Bytes, LoadError> {
        let url = self.endpoint.url_for(id);
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(LoadError::NotFound(id));
                }
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => match resp.bytes().await {
                        Ok(bytes) => return Ok(bytes),
                        Err(err) => last_err = Some(anyhow::Error::from(err)),
                    },
                    Err(err) => last_err = Some(anyhow::Error::from(err)),
                },
                Err(err) => last_err = Some(anyhow::Error::from(err)),
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tracing::debug!(%id, attempt, "tile fetch failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(LoadError::Fetch {
            id,
            source: last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted retries with no response")),
        })
    }
}

#[async_trait]
impl HeightTileLoadService for HttpTileLoadService {
    async fn load(&self, id: TileId) -> Result<Bytes, LoadError> {
        self.fetch(id).await
    }
}

#[async_trait]
impl OrthoTileLoadService for HttpTileLoadService {
    async fn load(&self, id: TileId) -> Result<Bytes, LoadError> {
        self.fetch(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrlPattern;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            pattern: UrlPattern::Zxy,
            extension: "png".to_string(),
        }
    }

    #[tokio::test]
    async fn unreachable_host_yields_fetch_error_after_retries() {
        let service = HttpTileLoadService::new(Client::new(), endpoint());
        let result = HeightTileLoadService::load(&service, TileId::new(1, 0, 0)).await;
        match result {
            Err(LoadError::Fetch { id, .. }) => assert_eq!(id, TileId::new(1, 0, 0)),
            other => panic!("expected a Fetch error, got {other:?}"),
        }
    }
}
