use std::{cell::RefCell, rc::Rc};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{effect, error::PersistError, storage::KeyValueStore, Signal, Subscription};


/// Where and how a value is mirrored into a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Storage key the JSON text is written under.
    pub key: String,
    /// Write indented JSON.
    pub pretty: bool,
}
impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            key: "records".to_string(),
            pretty: false,
        }
    }
}
impl PersistConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

/// Handle of a running [`persist`] effect.
///
/// Dropping it stops mirroring.
pub struct Persistence {
    _subscription: Subscription,
    last_error: Rc<RefCell<Option<PersistError>>>,
}
impl Persistence {
    /// Takes the error of the most recent failed write, if any.
    pub fn take_error(&self) -> Option<PersistError> {
        self.last_error.borrow_mut().take()
    }
}

/// Writes the value of `signal` to `store` as JSON now and every time it changes.
///
/// Failures do not stop mirroring; they are logged and kept for [`Persistence::take_error`].
pub fn persist<T>(
    signal: Signal<T>,
    store: Rc<dyn KeyValueStore>,
    config: &PersistConfig,
) -> Persistence
where
    T: Serialize + ?Sized + 'static,
{
    let config = config.clone();
    let last_error = Rc::new(RefCell::new(None));
    let errors = last_error.clone();
    let subscription = effect(move |sc| {
        let value = signal.borrow(sc);
        match write(&*value, &*store, &config) {
            Ok(len) => debug!("persisted {len} bytes to `{}`", config.key),
            Err(e) => {
                warn!("failed to persist `{}`: {e}", config.key);
                *errors.borrow_mut() = Some(e);
            }
        }
    });
    Persistence {
        _subscription: subscription,
        last_error,
    }
}

fn write<T: Serialize + ?Sized>(
    value: &T,
    store: &dyn KeyValueStore,
    config: &PersistConfig,
) -> Result<usize, PersistError> {
    let text = if config.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|source| PersistError::Encode {
        key: config.key.clone(),
        source,
    })?;
    store.set_item(&config.key, &text)?;
    Ok(text.len())
}

/// Reads the JSON text stored under `key`.
///
/// A missing key is `Ok(None)`; text that does not parse as `T` is [`PersistError::Decode`].
pub fn restore<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, PersistError> {
    let Some(text) = store.get_item(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistError::Decode {
            key: key.to_string(),
            source,
        })
}

/// Like [`restore`], but falls back to `T::default()` when the key is missing or unreadable.
pub fn restore_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> T {
    match restore(store, key) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!("discarding stored `{key}`: {e}");
            T::default()
        }
    }
}
