// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod memory;

pub use memory::MemoryDB;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod setting_keys {
    /// Prefix of the keys storing [`crate::deals::StorageDeal`] records, keyed by proposal cid.
    pub const DEALS_PREFIX: &str = "/deals/";
    /// Prefix of the keys storing voucher records, keyed by channel address.
    pub const PAYCH_PREFIX: &str = "/paych/";
}

/// Interface used to store and retrieve the engine's settlement records.
pub trait SettingsStore {
    /// Reads binary field from the Settings store. This should be used for
    /// non-serializable data. For serializable data, use [`SettingsStoreExt::read_obj`].
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes binary field to the Settings store. This should be used for
    /// non-serializable data. For serializable data, use [`SettingsStoreExt::write_obj`].
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Returns `Ok(true)` if key exists in store.
    fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Returns all setting keys.
    fn setting_keys(&self) -> anyhow::Result<Vec<String>>;
}

impl<T: ?Sized + SettingsStore> SettingsStore for std::sync::Arc<T> {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.as_ref().read_bin(key)
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.as_ref().write_bin(key, value)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.as_ref().exists(key)
    }

    fn setting_keys(&self) -> anyhow::Result<Vec<String>> {
        self.as_ref().setting_keys()
    }
}

/// Extension trait for the [`SettingsStore`] trait. It is implemented for all types that implement
/// [`SettingsStore`].
/// It provides methods for writing and reading any serializable object from the store, encoded
/// as `dag-cbor`.
pub trait SettingsStoreExt {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>>;
    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()>;

    /// Same as [`SettingsStoreExt::read_obj`], but returns an error if the key does not exist.
    fn require_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<V>;

    /// Reads every object stored under a key starting with `prefix`.
    fn read_prefixed<V: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<Vec<V>>;
}

impl<T: ?Sized + SettingsStore> SettingsStoreExt for T {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>> {
        match self.read_bin(key)? {
            Some(bytes) => Ok(Some(fvm_ipld_encoding::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()> {
        self.write_bin(key, &fvm_ipld_encoding::to_vec(value)?)
    }

    fn require_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<V> {
        self.read_bin(key)?
            .ok_or_else(|| anyhow::anyhow!("Key {key} not found"))
            .and_then(|bytes| fvm_ipld_encoding::from_slice(&bytes).map_err(Into::into))
    }

    fn read_prefixed<V: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<Vec<V>> {
        let mut keys = self.setting_keys()?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        keys.iter().map(|key| self.require_obj(key)).collect()
    }
}
