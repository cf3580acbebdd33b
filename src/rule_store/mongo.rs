//! MongoDB-backed `RuleStore`. No separate document↔domain conversion
//! layer: `RuleSet` derives `Serialize`/`Deserialize` already (see
//! `model.rs`) and is stored as its own BSON shape directly through
//! `mongodb::Collection<RuleSet>` — no separate document type, no mapper.

use super::RuleStore;
use crate::error::{FluxGateError, Result};
use crate::model::RuleSet;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

pub struct MongoRuleStore {
    collection: Collection<RuleSet>,
}

impl MongoRuleStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| FluxGateError::ConfigError(format!("invalid mongodb uri: {e}")))?;
        let client = Client::with_options(options)?;
        Ok(Self::from_client(client, database, collection))
    }

    pub fn from_client(client: Client, database: &str, collection: &str) -> Self {
        Self { collection: client.database(database).collection(collection) }
    }
}

#[async_trait]
impl RuleStore for MongoRuleStore {
    async fn find_by_id(&self, rule_set_id: &str) -> Result<Option<RuleSet>> {
        Ok(self.collection.find_one(doc! { "id": rule_set_id }).await?)
    }

    async fn find_all(&self) -> Result<Vec<RuleSet>> {
        let mut cursor = self.collection.find(doc! {}).await?;
        let mut out = Vec::new();
        use futures_util::TryStreamExt;
        while let Some(rule_set) = cursor.try_next().await? {
            out.push(rule_set);
        }
        Ok(out)
    }

    async fn save(&self, rule_set: RuleSet) -> Result<()> {
        self.collection
            .replace_one(doc! { "id": &rule_set.id }, &rule_set)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_by_id(&self, rule_set_id: &str) -> Result<()> {
        self.collection.delete_one(doc! { "id": rule_set_id }).await?;
        Ok(())
    }
}
