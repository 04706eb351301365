//! In-memory local store for tests and ephemeral sessions.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{LocalStore, StorageKey};

/// Local store backed by a plain map. Supports failure injection so tests can
/// exercise the degraded read/write paths.
#[derive(Default)]
pub struct MemoryStore {
  items: Mutex<HashMap<&'static str, String>>,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every subsequent `get_item` fail.
  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  /// Make every subsequent `set_item` fail.
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }
}

#[async_trait]
impl LocalStore for MemoryStore {
  async fn get_item(&self, key: StorageKey) -> Result<Option<String>> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("injected read failure for {}", key));
    }

    let items = self.items.lock().expect("store lock poisoned");
    Ok(items.get(key.as_str()).cloned())
  }

  async fn set_item(&self, key: StorageKey, value: String) -> Result<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("injected write failure for {}", key));
    }

    let mut items = self.items.lock().expect("store lock poisoned");
    items.insert(key.as_str(), value);
    Ok(())
  }
}
