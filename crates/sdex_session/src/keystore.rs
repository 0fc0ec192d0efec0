//! Opaque key/value storage for long-term key material.
//!
//! The device's key pair and the user PIN live in platform secure storage;
//! the core only needs "returns a string or absence". Implementations are
//! external collaborators; the in-memory store backs tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const PUBLIC_KEY: &str = "publicKey";
pub const PRIVATE_KEY: &str = "privateKey";
pub const PIN: &str = "pin";

pub trait KeyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A poisoned lock must not turn the store into a silent no-op: the map is
// plain data, valid regardless of where another thread panicked.
impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}
