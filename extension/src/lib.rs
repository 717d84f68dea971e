//! Messaging and settings-sync core shared by the extension's contexts.
//!
//! The background [`background::Coordinator`] owns the settings store and
//! answers every [`protocol::Message`]. Popup, options and content scripts talk
//! to it through [`client::ExtensionClient`] and watch settings through
//! [`storage::SettingsStore::on_changed`].

pub mod background;
pub mod client;
pub mod config;
pub mod content;
pub mod features;
pub mod port;
pub mod protocol;
pub mod runtime;
pub mod settings;
pub mod storage;

pub use background::{Coordinator, CoordinatorState, InstallReason};
pub use client::ExtensionClient;
pub use config::ExtensionConfig;
pub use content::{ContentScript, ContentScriptState};
pub use features::{has_access, Feature};
pub use protocol::{Message, MessageType, Messenger, Response, Router};
pub use settings::{SettingsPatch, Theme, Tier, UserSettings};
pub use storage::{LocalStore, SettingsStore};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn run() {
    let level = config::ExtensionConfig::bundled()
        .and_then(|config| config.logging.level_filter())
        .ok()
        .and_then(|filter| filter.to_level())
        .unwrap_or(log::Level::Info);
    wasm_logger::init(wasm_logger::Config::new(level));
    log::info!("Extension core loaded");
}
