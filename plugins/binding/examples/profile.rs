//! Example binding a persisted profile store to an Iced view
//!
//! The theme is saved to disk and restored on the next run.

use iced::widget::{button, column, row, text, text_input};
use iced::{Element, Subscription, Task};
use iced_persist::{AppName, FileStorage, Store, StoredState, WriteOutcome, create_store};
use iced_persist_binding::StoreBinding;
use serde_json::{Value, json};
use std::sync::Arc;

fn main() -> iced::Result {
    tracing_subscriber::fmt::init();

    iced::application(App::new, App::update, App::view)
        .subscription(App::subscription)
        .run()
}

#[derive(Debug, Clone)]
enum Message {
    Initialized(WriteOutcome),
    ThemeChanged(Option<Value>),
    ThemeInputChanged(String),
    Save,
    Saved(WriteOutcome),
}

struct App {
    store: Store,
    theme: StoreBinding<Value>,
    theme_input: String,
    status: String,
}

impl App {
    fn new() -> (Self, Task<Message>) {
        let app_name = AppName::new("com", "example", "persist_binding");
        let store = create_store(
            "profile",
            StoredState::from([("theme".to_string(), json!("light"))]),
            Arc::new(FileStorage::new(&app_name)),
        )
        .expect("the profile store is created once");

        let theme = StoreBinding::new(store.clone(), "theme");
        let init = {
            let store = store.clone();
            Task::perform(
                async move { store.initialize_store().await },
                Message::Initialized,
            )
        };

        let app = App {
            store,
            theme,
            theme_input: String::new(),
            status: "Loading".to_string(),
        };

        (app, init)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Initialized(outcome) => {
                self.status = describe(&outcome);
                if let Some(value) = self.theme.current() {
                    self.theme_input = display(&value);
                }
            }

            Message::ThemeChanged(value) => {
                self.theme_input = value.as_ref().map(display).unwrap_or_default();
            }

            Message::ThemeInputChanged(value) => {
                self.theme_input = value;
            }

            Message::Save => {
                return self
                    .theme
                    .set(json!(self.theme_input.clone()))
                    .map(Message::Saved);
            }

            Message::Saved(outcome) => {
                self.status = describe(&outcome);
            }
        }

        Task::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        self.theme.listen().map(Message::ThemeChanged)
    }

    fn view(&self) -> Element<'_, Message> {
        let keys = if self.store.is_initialized() {
            self.store.get_state().len()
        } else {
            0
        };

        column![
            text("Persisted Profile").size(32),
            text(format!("Status: {}", self.status)).size(14),
            text(format!("{} keys in '{}'", keys, self.store.name())).size(14),
            row![
                text("Theme:").width(100),
                text_input("light, dark, auto", &self.theme_input)
                    .on_input(Message::ThemeInputChanged)
                    .width(200),
                button("Save").on_press(Message::Save),
            ]
            .spacing(10),
        ]
        .spacing(10)
        .padding(20)
        .into()
    }
}

fn describe(outcome: &WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Persisted => "Saved".to_string(),
        WriteOutcome::Unpersisted(e) => format!("Not saved: {}", e),
        WriteOutcome::Ignored => "No change".to_string(),
    }
}

fn display(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
