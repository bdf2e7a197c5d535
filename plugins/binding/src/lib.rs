//! Iced binding for persisted stores
//!
//! Connects a [`Store`] to an Iced application: read a key when a view is
//! built, receive the key's new value through a [`Subscription`] whenever the
//! store changes, and write back with a [`Task`].
//!
//! # Example
//!
//! ```ignore
//! use iced_persist_binding::StoreBinding;
//!
//! struct App {
//!     theme: StoreBinding<serde_json::Value>,
//! }
//!
//! impl App {
//!     fn subscription(&self) -> Subscription<Message> {
//!         self.theme.listen().map(Message::ThemeChanged)
//!     }
//!
//!     fn update(&mut self, message: Message) -> Task<Message> {
//!         match message {
//!             Message::PickDark => self.theme.set(json!("dark")).map(Message::Saved),
//!             // ...
//!         }
//!     }
//! }
//! ```

use iced::futures::channel::mpsc;
use iced::futures::stream::BoxStream;
use iced::futures::{SinkExt, Stream, StreamExt};
use iced::{Subscription, Task};
use iced_persist::{StateValue, Store, StoredState, Unsubscribe, WriteOutcome};
use std::hash::{Hash, Hasher};

/// A single key of a store, bound to the UI
#[derive(Clone, Debug)]
pub struct StoreBinding<V> {
    store: Store<V>,
    key: String,
}

impl<V: StateValue> StoreBinding<V> {
    /// Bind `key` of `store`
    ///
    /// # Arguments
    ///
    /// * `store` - The store holding the value
    /// * `key` - The key to read, watch and write
    pub fn new(store: Store<V>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The bound key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The store the key lives in
    pub fn store(&self) -> &Store<V> {
        &self.store
    }

    /// Value of the key right now
    pub fn current(&self) -> Option<V> {
        let value = self.store.get(&self.key);
        tracing::debug!(
            store = self.store.name(),
            key = %self.key,
            found = value.is_some(),
            "read current value"
        );
        value
    }

    /// Emits the key's value after every change to the store
    ///
    /// The store listener is removed when the subscription is dropped.
    pub fn listen(&self) -> Subscription<Option<V>> {
        let watch = Watch {
            store: self.store.clone(),
            key: Some(self.key.clone()),
        };
        Subscription::run_with(watch, key_stream::<V>)
    }

    /// Write `value` under the key
    pub fn set(&self, value: V) -> Task<WriteOutcome> {
        let store = self.store.clone();
        let key = self.key.clone();

        Task::perform(
            async move { store.set(key, value).await },
            std::convert::identity,
        )
    }
}

/// Emits the whole state after every change to `store`
pub fn watch<V: StateValue>(store: &Store<V>) -> Subscription<StoredState<V>> {
    let watch = Watch {
        store: store.clone(),
        key: None,
    };
    Subscription::run_with(watch, state_stream::<V>)
}

/// Identity of a running store subscription
struct Watch<V> {
    store: Store<V>,
    key: Option<String>,
}

impl<V: StateValue> Hash for Watch<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store.namespace().hash(state);
        self.store.name().hash(state);
        self.key.hash(state);
        std::any::type_name::<V>().hash(state);
    }
}

fn key_stream<V: StateValue>(watch: &Watch<V>) -> BoxStream<'static, Option<V>> {
    let key = watch.key.clone().unwrap_or_default();
    Box::pin(store_updates(watch.store.clone(), move |state| {
        state.get(&key).cloned()
    }))
}

fn state_stream<V: StateValue>(watch: &Watch<V>) -> BoxStream<'static, StoredState<V>> {
    Box::pin(store_updates(watch.store.clone(), |state| state.clone()))
}

/// Removes the store listener when the stream is dropped
struct Listening(Unsubscribe);

impl Drop for Listening {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

/// Forward every store notification, mapped through `select`, into a stream
fn store_updates<V, T, F>(store: Store<V>, select: F) -> impl Stream<Item = T>
where
    V: StateValue,
    T: Send + 'static,
    F: Fn(&StoredState<V>) -> T + Send + Sync + 'static,
{
    iced::stream::channel(100, move |mut output: mpsc::Sender<T>| async move {
        let (sender, mut receiver) = mpsc::unbounded();

        let _listening = Listening(store.subscribe(move |state: &StoredState<V>| {
            let _ = sender.unbounded_send(select(state));
        }));

        while let Some(value) = receiver.next().await {
            if output.send(value).await.is_err() {
                break;
            }
        }
    })
}
