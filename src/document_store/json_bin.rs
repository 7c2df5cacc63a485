use super::DocumentStore;
use anyhow::{anyhow, Result};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.jsonbin.io/v3";

/// Document kept in a remote JSON bin, addressed by bin id.
pub struct JsonBinStore {
    client: reqwest::Client,
    base_url: String,
    bin_id: String,
    api_key: String,
}

#[derive(serde::Deserialize)]
struct LatestResponse {
    #[serde(default)]
    record: Value,
}

impl JsonBinStore {
    pub fn new(base_url: &str, bin_id: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            bin_id: bin_id.to_owned(),
            api_key: api_key.to_owned(),
        }
    }

    fn bin_url(&self) -> String {
        format!("{}/b/{}", self.base_url, self.bin_id)
    }
}

#[serenity::async_trait]
impl DocumentStore for JsonBinStore {
    fn describe(&self) -> String {
        format!("bin {}", self.bin_id)
    }

    async fn get(&self) -> Result<Value> {
        let url = format!("{}/latest", self.bin_url());
        let response = self
            .client
            .get(&url)
            .header("X-Master-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| anyhow!("Could not fetch {}: {}", self.describe(), e))?
            .error_for_status()
            .map_err(|e| anyhow!("Could not fetch {}: {}", self.describe(), e))?
            .json::<LatestResponse>()
            .await
            .map_err(|e| anyhow!("Could not parse {}: {}", self.describe(), e))?;

        Ok(response.record)
    }

    async fn put(&self, doc: &Value) -> Result<()> {
        self.client
            .put(self.bin_url())
            .header("X-Master-Key", &self.api_key)
            .json(doc)
            .send()
            .await
            .map_err(|e| anyhow!("Could not update {}: {}", self.describe(), e))?
            .error_for_status()
            .map_err(|e| anyhow!("Could not update {}: {}", self.describe(), e))?;

        Ok(())
    }
}
