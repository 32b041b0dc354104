//! Catalog access for the table
//!
//! Clip lists are fetched from the server by category whenever the scheduler
//! asks for a queue.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use pran_common::catalog::{AudioClip, ClipCategory};

use crate::error::{Error, Result};

/// Source of per-category clip lists
pub trait ClipSource: Send + Sync + 'static {
    fn list_clips(
        &self,
        category: ClipCategory,
    ) -> impl Future<Output = Result<Vec<AudioClip>>> + Send;
}

/// Catalog served by pran-server
pub struct HttpCatalog {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ClipSource for HttpCatalog {
    async fn list_clips(&self, category: ClipCategory) -> Result<Vec<AudioClip>> {
        let url = format!("{}/api/catalog/audio/{}", self.base_url, category);
        debug!(url = %url, "Fetching clip list");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Catalog(format!(
                "{} answered {}: {}",
                url,
                status.as_u16(),
                body
            )));
        }

        let clips: Vec<AudioClip> = response.json().await?;
        if let Some(stray) = clips.iter().find(|c| c.category != category) {
            return Err(Error::Catalog(format!(
                "clip {} listed under {} belongs to {}",
                stray.id, category, stray.category
            )));
        }
        Ok(clips)
    }
}
