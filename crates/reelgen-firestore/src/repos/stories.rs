//! Story-generation requests.

use reelgen_models::{Story, StoryRequest, StoryRequestId, StoryStatus};

use super::collections::STORY_GENERATIONS;
use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::fields::{FieldPath, FieldUpdates};
use crate::types::{encode_fields, to_value};

#[derive(Clone)]
pub struct StoryRequestRepository {
    client: FirestoreClient,
}

impl StoryRequestRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &StoryRequestId) -> FirestoreResult<Option<StoryRequest>> {
        match self.client.get_document(STORY_GENERATIONS, id.as_str()).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn create(&self, request: &StoryRequest) -> FirestoreResult<()> {
        self.client
            .create_document(STORY_GENERATIONS, request.id.as_str(), encode_fields(request)?)
            .await?;
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: &StoryRequestId,
        status: StoryStatus,
        error: Option<&str>,
    ) -> FirestoreResult<()> {
        let mut updates = FieldUpdates::new().set(FieldPath::new("status"), to_value(&status)?);
        if let Some(error) = error {
            updates = updates.set(FieldPath::new("error"), error);
        }
        self.client
            .update_document(STORY_GENERATIONS, id.as_str(), updates.touch())
            .await?;
        Ok(())
    }

    pub async fn complete(&self, id: &StoryRequestId, story: &Story) -> FirestoreResult<()> {
        let updates = FieldUpdates::new()
            .set(FieldPath::new("status"), to_value(&StoryStatus::Completed)?)
            .set(FieldPath::new("story"), to_value(story)?)
            .touch();
        self.client
            .update_document(STORY_GENERATIONS, id.as_str(), updates)
            .await?;
        Ok(())
    }
}
