//! Session identity and lifecycle.
//!
//! A session binds a username to that user's persisted conversation. Only
//! one user is logged in at a time; logging out forgets both the user and
//! their history.

use std::sync::Arc;

use tracing::info;

use crate::chat::MessageStore;
use crate::error::{SessionError, SessionResult};
use crate::storage::{history_key, ActiveUser, Storage};

/// Which screen the front-end should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Ask for a name.
    Login,
    /// Show the conversation.
    Chat,
}

impl Screen {
    /// Chat is only reachable with an open session
    pub fn for_session(session: Option<&SessionContext>) -> Self {
        match session {
            Some(_) => Screen::Chat,
            None => Screen::Login,
        }
    }
}

/// An open session: the user and their conversation.
pub struct SessionContext {
    username: String,
    store: MessageStore,
    storage: Arc<dyn Storage>,
}

impl SessionContext {
    /// Reopen the persisted session, if a user is logged in
    pub async fn resume(storage: Arc<dyn Storage>) -> SessionResult<Option<Self>> {
        let Some(user) = storage.get_active_user().await? else {
            return Ok(None);
        };
        info!(user = %user.username, "Resuming session");
        Ok(Some(Self::open(storage, user.username).await))
    }

    /// Log in as `username`; surrounding whitespace is ignored
    pub async fn login(storage: Arc<dyn Storage>, username: &str) -> SessionResult<Self> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }

        storage.set_active_user(&ActiveUser::new(username)).await?;
        info!(user = %username, "Logged in");
        Ok(Self::open(storage, username.to_string()).await)
    }

    async fn open(storage: Arc<dyn Storage>, username: String) -> Self {
        let store = MessageStore::load(storage.clone(), history_key(&username)).await;
        Self {
            username,
            store,
            storage,
        }
    }

    /// The logged-in user
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The user's conversation
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// The user's conversation, mutably
    pub fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    /// Log out: remove the conversation snapshot and the identity record
    pub async fn end(&mut self) -> SessionResult<()> {
        self.store.clear().await;
        self.storage.clear_active_user().await?;
        Ok(())
    }
}
