// Chrome Storage API integration
// chrome.storage.sync for settings, chrome.storage.local for larger payloads

use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use super::{
    AreaName, ChangeListener, ListenerId, ObservableArea, StorageArea, StorageChange,
    StorageChanges, StorageItems,
};
use crate::protocol::chrome::{from_js, js_error, to_js};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "sync"], js_name = get)]
    fn sync_get(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "sync"], js_name = set)]
    fn sync_set(items: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "sync"], js_name = remove)]
    fn sync_remove(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "sync"], js_name = clear)]
    fn sync_clear() -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn local_get(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn local_set(items: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    fn local_remove(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = clear)]
    fn local_clear() -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn add_changed_listener(callback: &Closure<dyn FnMut(JsValue, String)>);

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = removeListener)]
    fn remove_changed_listener(callback: &Closure<dyn FnMut(JsValue, String)>);
}

pub struct ChromeArea {
    area: AreaName,
    listeners: RefCell<HashMap<ListenerId, Closure<dyn FnMut(JsValue, String)>>>,
    next_listener: Cell<u64>,
}

impl ChromeArea {
    pub fn new(area: AreaName) -> Self {
        Self {
            area,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(0),
        }
    }
}

fn key_list(keys: &[&str]) -> JsValue {
    let array = js_sys::Array::new();
    for key in keys {
        array.push(&JsValue::from_str(key));
    }
    array.into()
}

/// chrome reports `{ key: { oldValue?, newValue? } }`
fn parse_changes(changes: &JsValue) -> anyhow::Result<StorageChanges> {
    let Value::Object(changes) = from_js(changes)? else {
        return Ok(StorageChanges::new());
    };
    Ok(changes
        .into_iter()
        .map(|(key, mut change)| {
            let old_value = change.get_mut("oldValue").map(Value::take);
            let new_value = change.get_mut("newValue").map(Value::take);
            (
                key,
                StorageChange {
                    old_value,
                    new_value,
                },
            )
        })
        .collect())
}

#[async_trait(?Send)]
impl StorageArea for ChromeArea {
    fn area(&self) -> AreaName {
        self.area
    }

    async fn get(&self, keys: &[&str]) -> anyhow::Result<StorageItems> {
        let promise = match self.area {
            AreaName::Sync => sync_get(key_list(keys)),
            AreaName::Local => local_get(key_list(keys)),
        };
        let result = JsFuture::from(promise).await.map_err(js_error)?;
        match from_js(&result)? {
            Value::Object(items) => Ok(items),
            _ => Ok(StorageItems::new()),
        }
    }

    async fn set(&self, items: StorageItems) -> anyhow::Result<()> {
        let items = to_js(&Value::Object(items))?;
        let promise = match self.area {
            AreaName::Sync => sync_set(items),
            AreaName::Local => local_set(items),
        };
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> anyhow::Result<()> {
        let promise = match self.area {
            AreaName::Sync => sync_remove(key_list(keys)),
            AreaName::Local => local_remove(key_list(keys)),
        };
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let promise = match self.area {
            AreaName::Sync => sync_clear(),
            AreaName::Local => local_clear(),
        };
        JsFuture::from(promise).await.map_err(js_error)?;
        Ok(())
    }
}

impl ObservableArea for ChromeArea {
    fn add_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);

        let area = self.area;
        let callback = Closure::wrap(Box::new(move |changes: JsValue, area_name: String| {
            if area_name != area.as_str() {
                return;
            }
            match parse_changes(&changes) {
                Ok(changes) => listener(&changes),
                Err(err) => log::warn!("Unreadable storage change event: {:#}", err),
            }
        }) as Box<dyn FnMut(JsValue, String)>);

        add_changed_listener(&callback);
        self.listeners.borrow_mut().insert(id, callback);
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.borrow_mut().remove(&id) {
            Some(callback) => {
                remove_changed_listener(&callback);
                true
            }
            None => false,
        }
    }
}
