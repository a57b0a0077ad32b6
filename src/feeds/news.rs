//! Headlines from an RSS feed

use anyhow::{Context, Result};

use crate::api::HttpTransport;
use crate::models::Rss;

pub struct NewsFeed {
    transport: HttpTransport,
    url: String,
}

impl NewsFeed {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Current headlines in feed order.
    pub async fn fetch(&self) -> Result<Vec<String>> {
        let body = self
            .transport
            .get(&self.url)
            .await
            .context("No news response")?;
        parse_headlines(&body)
    }
}

fn parse_headlines(xml: &str) -> Result<Vec<String>> {
    let rss: Rss = quick_xml::de::from_str(xml).context("Failed to parse RSS")?;
    Ok(rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| item.title)
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .collect())
}
