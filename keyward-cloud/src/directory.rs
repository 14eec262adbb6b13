use crate::api_client::CloudApiClient;
use async_trait::async_trait;
use keyward_vault::{PublicKeyDirectory, VaultResult};

/// [`PublicKeyDirectory`] backed by the control plane API.
#[derive(Clone)]
pub struct CloudKeyDirectory {
    client: CloudApiClient,
}

impl CloudKeyDirectory {
    pub fn new(client: CloudApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CloudApiClient {
        &self.client
    }
}

#[async_trait]
impl PublicKeyDirectory for CloudKeyDirectory {
    async fn fetch_public_key(&self) -> VaultResult<Option<String>> {
        Ok(self.client.get_public_key().await?)
    }

    async fn publish_public_key(&self, public_key_armored: &str) -> VaultResult<()> {
        Ok(self.client.upload_public_key(public_key_armored).await?)
    }
}
