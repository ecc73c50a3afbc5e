//! Publishing channels.

use tracing::debug;

use reelgen_models::{Channel, ChannelCredentials, ChannelId};

use super::collections::CHANNELS;
use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::fields::{FieldPath, FieldUpdates};
use crate::types::to_value;

#[derive(Clone)]
pub struct ChannelRepository {
    client: FirestoreClient,
}

impl ChannelRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &ChannelId) -> FirestoreResult<Option<Channel>> {
        self.client
            .get_document(CHANNELS, id.as_str())
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn save_credentials(&self, id: &ChannelId, credentials: &ChannelCredentials) -> FirestoreResult<()> {
        let updates = FieldUpdates::new()
            .set(FieldPath::new("credentials"), to_value(credentials)?)
            .touch();
        self.client.update_document(CHANNELS, id.as_str(), updates).await?;
        debug!(channel_id = %id, "Saved refreshed channel credentials");
        Ok(())
    }
}
