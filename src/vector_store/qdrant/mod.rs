
use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{SearchHit, VectorIndex, VectorRecord};
use crate::config::QdrantConfig;
use crate::http::HttpClient;
use crate::{RagError, Result};

const API_KEY_HEADER: &str = "api-key";

/// Qdrant REST client
#[derive(Debug, Clone)]
pub struct QdrantClient {
    base_url: Url,
    api_key: String,
    http: HttpClient,
    upsert_batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [VectorRecord],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

fn store_error(error: anyhow::Error) -> RagError {
    RagError::VectorStore(format!("{:#}", error))
}

impl QdrantClient {
    #[inline]
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = HttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.retry_attempts,
        );

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            http,
            upsert_batch_size: config.upsert_batch_size.max(1),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// `path` appended to the configured URL, keeping any path prefix it carries
    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let raw = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&raw).with_context(|| format!("Failed to build Qdrant URL {}", raw))
    }

    fn collection_endpoint(&self, name: &str, suffix: &str) -> anyhow::Result<Url> {
        self.endpoint(&format!("/collections/{}{}", name, suffix))
    }

    fn get(&self, url: &Url) -> anyhow::Result<String> {
        self.http.with_retry(url.as_str(), |agent| {
            agent
                .get(url.as_str())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn put(&self, url: &Url, body: &str) -> anyhow::Result<String> {
        self.http.with_retry(url.as_str(), |agent| {
            agent
                .put(url.as_str())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post(&self, url: &Url, body: &str) -> anyhow::Result<String> {
        self.http.with_retry(url.as_str(), |agent| {
            agent
                .post(url.as_str())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    /// DELETE that treats a missing resource as success
    fn delete_if_exists(&self, url: &Url) -> anyhow::Result<()> {
        self.http.with_retry(url.as_str(), |agent| {
            match agent
                .delete(url.as_str())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .call()
            {
                Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
                Err(e) => Err(e),
            }
        })
    }

    fn parse<T: DeserializeOwned>(body: &str, what: &str) -> anyhow::Result<T> {
        let response: QdrantResponse<T> = serde_json::from_str(body)
            .with_context(|| format!("Failed to parse Qdrant {} response", what))?;
        Ok(response.result)
    }
}

impl VectorIndex for QdrantClient {
    #[inline]
    fn list_collections(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/collections").map_err(store_error)?;
        debug!("Listing collections at {}", url);

        let body = self
            .get(&url)
            .context("Failed to list collections")
            .map_err(store_error)?;
        let result: CollectionsResult = Self::parse(&body, "collections").map_err(store_error)?;

        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    #[inline]
    fn recreate_collection(&self, name: &str, dimension: u32) -> Result<()> {
        let url = self.collection_endpoint(name, "").map_err(store_error)?;

        self.delete_if_exists(&url)
            .with_context(|| format!("Failed to delete collection '{}'", name))
            .map_err(store_error)?;

        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine",
            }
        })
        .to_string();

        let response = self
            .put(&url, &body)
            .with_context(|| format!("Failed to create collection '{}'", name))
            .map_err(store_error)?;
        let created: bool = Self::parse(&response, "create collection").map_err(store_error)?;
        if !created {
            return Err(store_error(anyhow!(
                "Qdrant refused to create collection '{}'",
                name
            )));
        }

        info!(
            "Recreated collection '{}' with {} dimensions",
            name, dimension
        );
        Ok(())
    }

    #[inline]
    fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to upsert");
            return Ok(());
        }

        let mut url = self.collection_endpoint(name, "/points").map_err(store_error)?;
        url.query_pairs_mut().append_pair("wait", "true");

        for (i, slice) in records.chunks(self.upsert_batch_size).enumerate() {
            let body = serde_json::to_string(&UpsertRequest { points: slice })
                .context("Failed to serialize upsert request")
                .map_err(store_error)?;

            self.put(&url, &body)
                .with_context(|| {
                    format!(
                        "Failed to upsert slice {} ({} points) into '{}'",
                        i + 1,
                        slice.len(),
                        name
                    )
                })
                .map_err(store_error)?;

            debug!("Upserted slice {} with {} points", i + 1, slice.len());
        }

        info!("Upserted {} points into '{}'", records.len(), name);
        Ok(())
    }

    #[inline]
    fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let url = self
            .collection_endpoint(name, "/points/search")
            .map_err(store_error)?;

        let body = serde_json::to_string(&SearchRequest {
            vector,
            limit,
            with_payload: true,
        })
        .context("Failed to serialize search request")
        .map_err(store_error)?;

        let response = self
            .post(&url, &body)
            .with_context(|| format!("Failed to search collection '{}'", name))
            .map_err(store_error)?;
        let hits: Vec<SearchHit> = Self::parse(&response, "search").map_err(store_error)?;

        debug!("Search in '{}' returned {} hits", name, hits.len());
        Ok(hits)
    }
}
