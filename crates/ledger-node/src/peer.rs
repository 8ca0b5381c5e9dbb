use crate::constants::PEER_TIMEOUT_SECS;
use anyhow::{Context, Result};
use ledger_core::{reconcile::Peer, Block, ChainSummary};
use reqwest::Client;
use std::time::Duration;

/// Another ledger node reached over its HTTP API.
#[derive(Clone, Debug)]
pub struct HttpPeer {
    base_url: String,
    client: Client,
}

impl HttpPeer {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn client() -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(PEER_TIMEOUT_SECS))
            .build()
            .context("building peer http client")
    }
}

impl Peer for HttpPeer {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn summary(&self) -> Result<ChainSummary> {
        let url = format!("{}/chain/head", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decoding chain summary")
    }

    async fn blocks(&self) -> Result<Vec<Block>> {
        let url = format!("{}/chain/blocks", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decoding block list")
    }
}
