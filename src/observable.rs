//! Change-notifying values the launcher core publishes to whatever front end
//! is attached (a console, a window, a test).

use std::sync::{Mutex, PoisonError};

use crate::update::LauncherState;

pub const DEFAULT_VERSION_TEXT: &str = "0.0.0";
pub const DEFAULT_CHANGELOG: &str = "Changelog...";

type Observer<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A value that synchronously notifies its observers whenever it is set.
///
/// Observers run on the setting task, in no guaranteed order. They may `get`
/// the value but must not `set` or `subscribe` on the same `Observable`.
pub struct Observable<T> {
    value: Mutex<T>,
    observers: Mutex<Vec<Observer<T>>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> T {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, value: T) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();

        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(&value);
        }
    }

    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }
}

/// Everything a front end needs to render the launcher.
pub struct Presentation {
    /// Download progress, 0-100.
    pub download_progress: Observable<f32>,
    /// Latest published version as reported by the metadata endpoint.
    pub version: Observable<String>,
    pub changelog: Observable<String>,
    pub status: Observable<String>,
    pub state: Observable<LauncherState>,
}

impl Presentation {
    pub fn new() -> Self {
        Self {
            download_progress: Observable::new(0.0),
            version: Observable::new(DEFAULT_VERSION_TEXT.to_string()),
            changelog: Observable::new(DEFAULT_CHANGELOG.to_string()),
            status: Observable::new(String::new()),
            state: Observable::new(LauncherState::Init),
        }
    }

    pub fn status_text(&self) -> String {
        format!("Downloading... ({}%)", self.download_progress.get())
    }

    pub fn version_text(&self) -> String {
        format!("v{}", self.version.get())
    }
}

impl Default for Presentation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn set_notifies_every_observer_before_returning() {
        let value = Observable::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&seen);
        value.subscribe(move |v| sink.lock().unwrap().push(*v));
        let counter = Arc::clone(&calls);
        value.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        value.set(7);
        value.set(9);

        assert_eq!(*seen.lock().unwrap(), vec![7, 9]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(value.get(), 9);
    }

    #[test]
    fn set_without_observers_stores_value() {
        let value = Observable::new(String::from("a"));
        value.set(String::from("b"));
        assert_eq!(value.get(), "b");
    }

    #[test]
    fn presentation_defaults_and_derived_text() {
        let presentation = Presentation::new();
        assert_eq!(presentation.version_text(), "v0.0.0");
        assert_eq!(presentation.changelog.get(), "Changelog...");

        presentation.download_progress.set(42.0);
        presentation.version.set("2.3.1".to_string());
        assert_eq!(presentation.status_text(), "Downloading... (42%)");
        assert_eq!(presentation.version_text(), "v2.3.1");
    }
}
