use crate::cipher::UserCipher;
use snip_storage::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    store: Store,
    base_url: Arc<str>,
    cipher: UserCipher,
}

impl AppState {
    pub fn new(store: Store, public_base_url: impl Into<String>, cipher: UserCipher) -> Self {
        let base_url: String = public_base_url.into();
        Self {
            store,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            cipher,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cipher(&self) -> &UserCipher {
        &self.cipher
    }
}
