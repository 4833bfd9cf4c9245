//! Cross-platform persistent storage.
//!
//! - Web: `localStorage`
//! - Desktop: JSON files in the platform config directory (`<config>/rideshare/`)
//! - Tests: in-memory map

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};

/// Key/value persistence backend.
pub trait Storage {
    fn save_raw(&self, key: &str, value: &str) -> bool;
    fn load_raw(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str);
}

/// Save a value as JSON. Returns `true` if the write succeeded.
pub fn save<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => storage.save_raw(key, &json),
        Err(_) => false,
    }
}

/// Load a JSON value. Missing keys and malformed data both yield `None`.
pub fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let json = storage.load_raw(key)?;
    serde_json::from_str(&json).ok()
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl Storage for MemoryStorage {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        true
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok()?
    }
}

#[cfg(target_arch = "wasm32")]
impl Storage for LocalStorage {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        Self::storage()
            .map(|s| s.set_item(key, value).is_ok())
            .unwrap_or(false)
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        Self::storage()?.get_item(key).ok()?
    }

    fn remove(&self, key: &str) {
        if let Some(s) = Self::storage() {
            let _ = s.remove_item(key);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStorage {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage under the platform config directory, e.g. `~/.config/rideshare/`.
    pub fn in_config_dir() -> Option<Self> {
        Some(Self::new(dirs::config_dir()?.join("rideshare")))
    }

    fn path(&self, key: &str) -> Option<std::path::PathBuf> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).ok()?;
        }
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(self.dir.join(format!("{}.json", safe_key)))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Storage for FileStorage {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.path(key) else {
            return false;
        };
        std::fs::write(path, value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path(key)?).ok()
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.path(key) {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// The platform's default backend.
pub fn default_storage() -> Rc<dyn Storage> {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(LocalStorage)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        match FileStorage::in_config_dir() {
            Some(fs) => Rc::new(fs),
            None => Rc::new(MemoryStorage::default()),
        }
    }
}

const DRIVER_LOCATION_SET_KEY: &str = "rideshare_driver_location_set";

/// Persisted per-device session markers.
#[derive(Clone)]
pub struct SessionFlags {
    storage: Rc<dyn Storage>,
}

impl SessionFlags {
    pub fn new(storage: Rc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Whether the driver has saved a location at least once on this device.
    pub fn driver_location_set(&self) -> bool {
        load::<bool>(self.storage.as_ref(), DRIVER_LOCATION_SET_KEY).unwrap_or(false)
    }

    pub fn mark_driver_location_set(&self) -> bool {
        save(self.storage.as_ref(), DRIVER_LOCATION_SET_KEY, &true)
    }

    pub fn clear(&self) {
        self.storage.remove(DRIVER_LOCATION_SET_KEY);
    }
}
