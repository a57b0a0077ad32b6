//! Location lookup by public IP

use tokio::sync::OnceCell;

use crate::api::HttpTransport;
use crate::models::Location;

/// IP geolocation, looked up once and reused for the life of the process.
pub struct GeoLocation {
    transport: HttpTransport,
    url: String,
    cached: OnceCell<Location>,
}

impl GeoLocation {
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            cached: OnceCell::new(),
        }
    }

    /// Current location, or `None` if it is not known yet and the lookup
    /// failed. A failed lookup is retried on the next call.
    pub async fn location(&self) -> Option<Location> {
        let result = self
            .cached
            .get_or_try_init(|| async {
                match self.transport.get_json::<Location>(&self.url).await {
                    Some(location) => {
                        tracing::info!(
                            "Located at {:.4}, {:.4}",
                            location.latitude,
                            location.longitude
                        );
                        Ok(location)
                    }
                    None => Err(()),
                }
            })
            .await;

        match result {
            Ok(location) => Some(*location),
            Err(()) => {
                tracing::warn!("Geolocation lookup via {} failed", self.url);
                None
            }
        }
    }
}
