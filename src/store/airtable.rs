use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{Filter, RecordStore, StoreRecord};
use crate::config::StoreConfig;
use crate::error::StoreError;

const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<StoreRecord>,
    offset: Option<String>,
}

/// Airtable REST client for one table.
pub struct AirtableStore {
    client: Client,
    config: StoreConfig,
    table_url: Url,
}

impl AirtableStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let table_url = table_url(&config)?;
        Ok(Self {
            client,
            config,
            table_url,
        })
    }

    async fn list_page(
        &self,
        formula: &str,
        offset: Option<&str>,
    ) -> Result<ListResponse, StoreError> {
        let mut request = self
            .client
            .get(self.table_url.clone())
            .bearer_auth(&self.config.api_key)
            .query(&[("filterByFormula", formula), ("pageSize", PAGE_SIZE)]);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// Walk every page, handing each batch of rows to `visit`.
    async fn for_each_page<F>(&self, filter: &Filter, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(Vec<StoreRecord>),
    {
        let formula = filter.to_formula();
        let mut offset: Option<String> = None;
        loop {
            let page = self.list_page(&formula, offset.as_deref()).await?;
            debug!("Fetched page of {} records", page.records.len());
            visit(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<StoreRecord>, StoreError> {
        let mut records = Vec::new();
        self.for_each_page(filter, |page| records.extend(page)).await?;
        info!("Fetched {} records", records.len());
        Ok(records)
    }

    async fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut total = 0;
        self.for_each_page(filter, |page| total += page.len()).await?;
        Ok(total)
    }

    async fn mark_generated(
        &self,
        store_id: &str,
        attachment_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let body = update_body(&self.config, attachment_url);

        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Malformed(format!("cannot address record {}", store_id)))?
            .push(store_id);

        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Marked record {} as {}", store_id, self.config.done_status);
        Ok(())
    }
}

fn table_url(config: &StoreConfig) -> Result<Url, StoreError> {
    let mut url = Url::parse(&config.api_url)
        .map_err(|e| StoreError::Malformed(format!("invalid api url {}: {}", config.api_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Malformed(format!("cannot-be-a-base url: {}", config.api_url)))?
        .pop_if_empty()
        .push(&config.base_id)
        .push(&config.table_name);
    Ok(url)
}

fn update_body(config: &StoreConfig, attachment_url: Option<&str>) -> Value {
    let mut fields = Map::new();
    fields.insert(
        config.fields.status.clone(),
        Value::String(config.done_status.clone()),
    );
    if let Some(url) = attachment_url {
        fields.insert(config.fields.attachment.clone(), json!([{ "url": url }]));
    }
    json!({ "fields": fields })
}
