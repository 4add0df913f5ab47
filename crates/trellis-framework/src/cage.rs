//! Per-subject FSM context.
//!
//! A [`UserCage`] binds one conversational subject, identified by a
//! composite key derived from `(chat_id, user_id)`, to a storage backend.
//! The router builds a fresh cage for every handler attempt; the cage itself
//! holds no state beyond the key.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use trellis_storage::{BoxedStorage, Data, StorageResult};

use crate::error::{CageError, ConfigError};
use crate::state::Member;

/// Derives the storage key of a subject from its chat and user id.
pub type KeyMaker =
    Arc<dyn Fn(Option<i64>, Option<i64>) -> Result<String, ConfigError> + Send + Sync>;

/// The default key layout, `"{chat}:{user}"`.
///
/// A missing id falls back to the other one, so private chats where only
/// one of them is known still get a stable key.
pub fn default_key(chat_id: Option<i64>, user_id: Option<i64>) -> Result<String, ConfigError> {
    match (chat_id.or(user_id), user_id.or(chat_id)) {
        (Some(chat), Some(user)) => Ok(format!("{chat}:{user}")),
        _ => Err(ConfigError::MissingKey),
    }
}

/// Returns [`default_key`] as a [`KeyMaker`].
pub fn default_key_maker() -> KeyMaker {
    Arc::new(default_key)
}

/// Anything that names a state: a raw string, a [`Member`], or `None`.
pub trait IntoStateName {
    /// Returns the state name, `None` meaning "no state".
    fn into_state_name(self) -> Option<String>;
}

impl IntoStateName for &str {
    fn into_state_name(self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl IntoStateName for String {
    fn into_state_name(self) -> Option<String> {
        Some(self)
    }
}

impl IntoStateName for &String {
    fn into_state_name(self) -> Option<String> {
        Some(self.clone())
    }
}

impl IntoStateName for Member {
    fn into_state_name(self) -> Option<String> {
        Some(self.name().to_owned())
    }
}

impl IntoStateName for &Member {
    fn into_state_name(self) -> Option<String> {
        Some(self.name().to_owned())
    }
}

impl<T: IntoStateName> IntoStateName for Option<T> {
    fn into_state_name(self) -> Option<String> {
        self.and_then(IntoStateName::into_state_name)
    }
}

/// The FSM context of one subject.
#[derive(Clone)]
pub struct UserCage {
    key: Arc<str>,
    storage: BoxedStorage,
}

impl UserCage {
    /// Creates a cage keyed with [`default_key`].
    pub fn new(
        storage: BoxedStorage,
        chat_id: Option<i64>,
        user_id: Option<i64>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_key(storage, default_key(chat_id, user_id)?))
    }

    /// Creates a cage keyed with a custom key maker.
    pub fn with_key_maker(
        storage: BoxedStorage,
        chat_id: Option<i64>,
        user_id: Option<i64>,
        key_maker: &KeyMaker,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_key(storage, key_maker(chat_id, user_id)?))
    }

    /// Creates a cage for an already derived key.
    pub fn from_key(storage: BoxedStorage, key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
            storage,
        }
    }

    /// Returns the storage key of this subject.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the backend this cage writes to.
    pub fn storage(&self) -> &BoxedStorage {
        &self.storage
    }

    pub async fn get_state(&self) -> StorageResult<Option<String>> {
        self.storage.get_state(&self.key).await
    }

    /// Moves the subject to `state`; `None` clears it.
    pub async fn set_state(&self, state: impl IntoStateName) -> StorageResult<()> {
        let state = state.into_state_name();
        self.storage.set_state(&self.key, state.as_deref()).await
    }

    pub async fn get_data(&self) -> StorageResult<Data> {
        self.storage.get_data(&self.key).await
    }

    /// Replaces the data; `None` resets it to the backend's default.
    pub async fn set_data(&self, data: Option<Data>) -> StorageResult<()> {
        self.storage.set_data(&self.key, data).await
    }

    /// Shallow-merges `partial` into the data.
    ///
    /// `partial` must serialize to a JSON object (or `null`, which merges
    /// nothing). Anything else fails before storage is touched.
    pub async fn update_data<T: Serialize>(&self, partial: T) -> Result<(), CageError> {
        let partial = match serde_json::to_value(partial)? {
            Value::Object(map) => map,
            Value::Null => Data::new(),
            other => return Err(CageError::NotAMapping(json_type(&other))),
        };
        self.storage.update_data(&self.key, partial).await?;
        Ok(())
    }

    /// Shallow-merges individual fields into the data.
    ///
    /// ```rust,ignore
    /// cage.update_fields([("age", json!(30))]).await?;
    /// ```
    pub async fn update_fields<I, K, V>(&self, fields: I) -> Result<(), CageError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let mut partial = Data::new();
        for (key, value) in fields {
            partial.insert(key.into(), serde_json::to_value(value)?);
        }
        self.storage.update_data(&self.key, partial).await?;
        Ok(())
    }

    pub async fn reset_state(&self) -> StorageResult<()> {
        self.storage.reset_state(&self.key).await
    }

    pub async fn reset_data(&self) -> StorageResult<()> {
        self.storage.reset_data(&self.key).await
    }

    /// Clears both state and data. Freeing an empty subject is a no-op.
    pub async fn free(&self) -> StorageResult<()> {
        self.storage.reset(&self.key).await
    }
}

impl fmt::Debug for UserCage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCage").field("key", &self.key).finish()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_storage::MemoryStorage;

    use crate::state::StateGroup;

    fn cage() -> UserCage {
        UserCage::new(Arc::new(MemoryStorage::new()), Some(100), Some(7)).unwrap()
    }

    #[test]
    fn test_default_key() {
        assert_eq!(default_key(Some(1), Some(2)).unwrap(), "1:2");
        assert_eq!(default_key(Some(1), None).unwrap(), "1:1");
        assert_eq!(default_key(None, Some(2)).unwrap(), "2:2");
        assert!(matches!(default_key(None, None), Err(ConfigError::MissingKey)));
    }

    #[test]
    fn test_custom_key_maker() {
        let per_user: KeyMaker = Arc::new(|_, user| {
            user.map(|u| format!("user-{u}")).ok_or(ConfigError::MissingKey)
        });
        let storage: BoxedStorage = Arc::new(MemoryStorage::new());
        let cage = UserCage::with_key_maker(storage, Some(1), Some(2), &per_user).unwrap();
        assert_eq!(cage.key(), "user-2");
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let form = StateGroup::from_states("Form", ["name", "age"]).unwrap();
        let age = form.member("age").unwrap();
        let cage = cage();

        cage.set_state(&age).await.unwrap();
        assert_eq!(cage.get_state().await.unwrap().as_deref(), Some("Form.age"));

        cage.set_state(None::<&str>).await.unwrap();
        assert_eq!(cage.get_state().await.unwrap(), None);

        cage.set_state("custom").await.unwrap();
        assert_eq!(cage.get_state().await.unwrap().as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_data_round_trip() {
        let cage = cage();

        cage.update_data(json!({"a": 1})).await.unwrap();
        cage.update_fields([("b", 2)]).await.unwrap();
        assert_eq!(json!(cage.get_data().await.unwrap()), json!({"a": 1, "b": 2}));

        cage.set_data(None).await.unwrap();
        assert!(cage.get_data().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_data_rejects_non_mappings() {
        let cage = cage();
        cage.update_data(json!({"kept": true})).await.unwrap();

        let err = cage.update_data(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, CageError::NotAMapping("an array")));
        assert_eq!(json!(cage.get_data().await.unwrap()), json!({"kept": true}));
    }

    #[tokio::test]
    async fn test_free_is_idempotent() {
        let cage = cage();
        cage.free().await.unwrap();

        cage.set_state("x").await.unwrap();
        cage.update_fields([("k", "v")]).await.unwrap();
        cage.free().await.unwrap();
        cage.free().await.unwrap();

        assert_eq!(cage.get_state().await.unwrap(), None);
        assert!(cage.get_data().await.unwrap().is_empty());
    }
}
