//! Read-only templates and content types.

use reelgen_models::{ContentType, Template};

use super::collections::{CONTENT_TYPES, TEMPLATES};
use crate::client::FirestoreClient;
use crate::error::FirestoreResult;

#[derive(Clone)]
pub struct CatalogRepository {
    client: FirestoreClient,
}

impl CatalogRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn template(&self, id: &str) -> FirestoreResult<Option<Template>> {
        self.client
            .get_document(TEMPLATES, id)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn content_type(&self, id: &str) -> FirestoreResult<Option<ContentType>> {
        self.client
            .get_document(CONTENT_TYPES, id)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }
}
