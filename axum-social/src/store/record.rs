use std::{borrow::Cow, collections::BTreeMap, fmt};

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OAuthError, Provider, Result, Session};

#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId(Box<str>);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4().to_string().into_boxed_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SessionId> for Cow<'static, str> {
    fn from(value: SessionId) -> Self {
        Cow::Owned(value.0.into_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Freshly minted, nothing was loaded.
    New,
    /// Matches what the key-value store holds.
    Loaded,
    /// Has changes that still need a [`save`](crate::SessionStore::save).
    Dirty,
    Deleted,
}

/// The provider name to session mapping of one browser.
///
/// Sessions are kept in their marshalled form and only turned back into a
/// typed [`Session`] by the owning provider. Every change is tracked per
/// provider so concurrent saves of the same record merge instead of
/// overwriting each other's entries.
#[derive(Debug, Clone)]
pub struct SessionSetRecord {
    id: SessionId,
    is_new: bool,
    state: RecordState,
    sessions: BTreeMap<String, String>,
    changes: BTreeMap<String, Option<String>>,
}

impl SessionSetRecord {
    pub(crate) fn new() -> Self {
        Self {
            id: SessionId::new(),
            is_new: true,
            state: RecordState::New,
            sessions: BTreeMap::new(),
            changes: BTreeMap::new(),
        }
    }

    pub(crate) fn loaded(id: SessionId, sessions: BTreeMap<String, String>) -> Self {
        Self {
            id,
            is_new: false,
            state: RecordState::Loaded,
            sessions,
            changes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// `true` when minted for this request, `false` when loaded from storage.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == RecordState::Dirty
    }

    /// Marshalled session of `provider`.
    pub fn get(&self, provider: &str) -> Option<&str> {
        self.sessions.get(provider).map(String::as_str)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.sessions.contains_key(provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn sessions(&self) -> &BTreeMap<String, String> {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Decodes the session stored for `provider`.
    pub fn session(&self, provider: &dyn Provider) -> Result<Box<dyn Session>> {
        let data = self
            .get(provider.name())
            .ok_or_else(|| OAuthError::SessionNotFound(provider.name().to_owned()))?;

        provider.unmarshal_session(data)
    }

    /// Replaces the session stored for `provider`.
    pub fn set(&mut self, provider: &str, session: &dyn Session) -> Result<()> {
        let data = session.marshal()?;
        self.insert(provider, data);
        Ok(())
    }

    pub fn insert(&mut self, provider: impl Into<String>, data: impl Into<String>) {
        let provider = provider.into();
        let data = data.into();
        self.changes.insert(provider.clone(), Some(data.clone()));
        self.sessions.insert(provider, data);
        self.state = RecordState::Dirty;
    }

    pub fn remove(&mut self, provider: &str) -> Option<String> {
        let removed = self.sessions.remove(provider)?;
        self.changes.insert(provider.to_owned(), None);
        self.state = RecordState::Dirty;
        Some(removed)
    }

    /// Applies this record's pending changes on top of `base`.
    pub(crate) fn merge_into(&self, mut base: BTreeMap<String, String>) -> BTreeMap<String, String> {
        for (provider, change) in &self.changes {
            match change {
                Some(data) => base.insert(provider.clone(), data.clone()),
                None => base.remove(provider),
            };
        }
        base
    }

    pub(crate) fn mark_saved(&mut self, sessions: BTreeMap<String, String>) {
        self.sessions = sessions;
        self.changes.clear();
        self.state = RecordState::Loaded;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.sessions.clear();
        self.changes.clear();
        self.state = RecordState::Deleted;
    }
}

impl Default for SessionSetRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// The persisted form of a record.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub(crate) updated_at: u64,
    pub(crate) sessions: BTreeMap<String, String>,
}

impl StoredRecord {
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(OAuthError::Encode)
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl<S> FromRequestParts<S> for SessionSetRecord
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, StatusCode> {
        if let Some(record) = parts.extensions.remove::<SessionSetRecord>() {
            Ok(record)
        } else {
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
