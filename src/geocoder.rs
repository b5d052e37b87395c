//! Client for the census batch geocoding endpoint.
//!
//! One batch is one multipart POST: the addresses go up as a CSV file in the
//! `addressFile` field, the benchmark/vintage/layers selection as query
//! parameters. The response body is plain text, one result row per line.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, EXPIRES};
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::config::GeocoderConfig;
use crate::models::AddressRecord;

/// Sends one batch to a geocoding backend and returns the raw response text.
#[async_trait]
pub trait BatchSubmitter {
    async fn submit(&self, batch: &[AddressRecord]) -> Result<String>;
}

/// Serializes a batch as the service's header-less CSV upload, every field quoted.
pub fn batch_csv(batch: &[AddressRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in batch {
        writer
            .write_record(record.upload_fields())
            .with_context(|| format!("Failed to serialize address {}", record.id))?;
    }
    let bytes = writer.into_inner().context("Failed to finish address upload")?;
    String::from_utf8(bytes).context("Address upload is not valid UTF-8")
}

pub struct CensusGeocoder {
    http: Client,
    url: String,
    query: [(&'static str, String); 3],
}

impl CensusGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            url: config.url.clone(),
            query: [
                ("benchmark", config.benchmark.clone()),
                ("vintage", config.vintage.clone()),
                ("layers", config.layers.clone()),
            ],
        })
    }

    fn address_file(batch: &[AddressRecord]) -> Result<Part> {
        let mut headers = HeaderMap::new();
        headers.insert(EXPIRES, HeaderValue::from_static("0"));
        Part::text(batch_csv(batch)?)
            .file_name("input.csv")
            .mime_str("text/csv")
            .map(|part| part.headers(headers))
            .context("Failed to build addressFile part")
    }
}

#[async_trait]
impl BatchSubmitter for CensusGeocoder {
    async fn submit(&self, batch: &[AddressRecord]) -> Result<String> {
        let form = Form::new().part("addressFile", Self::address_file(batch)?);
        debug!("Posting {} addresses to {}", batch.len(), self.url);

        let response = self
            .http
            .post(&self.url)
            .query(&self.query)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to submit batch of {} addresses", batch.len()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Geocoder API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ));
        }

        response
            .text()
            .await
            .context("Failed to read geocoder response body")
    }
}
