use super::StorageDriver;
use crate::error::Result;
use async_trait::async_trait;

/// HTTP endpoint mount. Remote endpoints cannot be enumerated, so the
/// driver fetches an `index.json` key manifest from the endpoint root at
/// mount time; the fetch doubles as the fail-fast reachability probe.
pub struct HttpDriver {
    base_url: String,
    client: reqwest::Client,
    keys: Vec<String>,
}

impl HttpDriver {
    pub async fn connect(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::new();
        let mut keys: Vec<String> = client
            .get(format!("{base_url}/index.json"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        keys.sort();
        Ok(HttpDriver {
            base_url,
            client,
            keys,
        })
    }
}

#[async_trait]
impl StorageDriver for HttpDriver {
    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.keys.clone())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(format!("{}/{key}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
