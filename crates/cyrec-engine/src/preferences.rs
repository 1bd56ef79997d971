use crate::config::schema::SelectorConfig;
use crate::storage::{self, KeyValueStore, StorageError};
use cyrec_common::protocol::keys;

/// The two persisted, user-editable selector attribute lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorPreferences {
    pub preferred: Vec<String>,
    pub optional_attributes: Vec<String>,
}

impl From<&SelectorConfig> for SelectorPreferences {
    fn from(config: &SelectorConfig) -> Self {
        Self {
            preferred: config.preferred.clone(),
            optional_attributes: config.optional_attributes.clone(),
        }
    }
}

impl SelectorPreferences {
    /// Reads both lists, falling back to `seed` for any list not yet stored.
    pub async fn load<S: KeyValueStore + ?Sized>(
        store: &S,
        seed: &SelectorConfig,
    ) -> Result<Self, StorageError> {
        let preferred = storage::load(store, keys::SELECTOR_PREFERENCE_LIST)
            .await?
            .unwrap_or_else(|| seed.preferred.clone());
        let optional_attributes = storage::load(store, keys::SELECTOR_OPTIONAL_ATTRIBUTES)
            .await?
            .unwrap_or_else(|| seed.optional_attributes.clone());
        Ok(Self {
            preferred,
            optional_attributes,
        })
    }

    pub async fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<(), StorageError> {
        storage::save(store, keys::SELECTOR_PREFERENCE_LIST, &self.preferred).await?;
        storage::save(store, keys::SELECTOR_OPTIONAL_ATTRIBUTES, &self.optional_attributes).await
    }
}
