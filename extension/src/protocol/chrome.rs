// chrome.runtime / chrome.tabs bindings for the protocol
// Values cross the JS boundary as JSON text

use async_trait::async_trait;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use super::messenger::Transport;
use super::tabs::{active_tab_filter, TabId, TabInfo, TabQuery};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    fn runtime_send_message(message: JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = sendMessage)]
    fn tabs_send_message(tab_id: u32, message: JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query: JsValue) -> Result<js_sys::Promise, JsValue>;
}

pub(crate) fn to_js(value: &Value) -> anyhow::Result<JsValue> {
    let text = serde_json::to_string(value)?;
    js_sys::JSON::parse(&text).map_err(js_error)
}

pub(crate) fn from_js(value: &JsValue) -> anyhow::Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text = js_sys::JSON::stringify(value)
        .map_err(js_error)?
        .as_string()
        .unwrap_or_default();
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn js_error(err: JsValue) -> anyhow::Error {
    match err.dyn_into::<js_sys::Error>() {
        Ok(err) => anyhow::anyhow!("{}", String::from(err.message())),
        Err(other) => anyhow::anyhow!("{:?}", other),
    }
}

async fn settle(promise: Result<js_sys::Promise, JsValue>) -> anyhow::Result<Value> {
    let result = JsFuture::from(promise.map_err(js_error)?)
        .await
        .map_err(js_error)?;
    // No listener answered: the port closed without a reply
    if result.is_undefined() {
        anyhow::bail!("The message port closed before a response was received.");
    }
    from_js(&result)
}

async fn query_tabs(query: Value) -> anyhow::Result<Vec<TabInfo>> {
    let tabs = settle(tabs_query(to_js(&query)?)).await?;
    let Value::Array(tabs) = tabs else {
        return Ok(Vec::new());
    };
    // Tabs without an id (devtools and the like) are skipped
    Ok(tabs
        .into_iter()
        .filter_map(|tab| serde_json::from_value(tab).ok())
        .collect())
}

/// Transport backed by the extension runtime
pub struct ChromeTransport;

#[async_trait(?Send)]
impl Transport for ChromeTransport {
    async fn send_message(&self, message: Value) -> anyhow::Result<Value> {
        settle(runtime_send_message(to_js(&message)?)).await
    }

    async fn send_to_tab(&self, tab: TabId, message: Value) -> anyhow::Result<Value> {
        settle(tabs_send_message(tab, to_js(&message)?)).await
    }

    async fn peers(&self) -> anyhow::Result<Vec<TabId>> {
        let tabs = query_tabs(serde_json::json!({})).await?;
        Ok(tabs.into_iter().map(|tab| tab.id).collect())
    }
}

#[async_trait(?Send)]
impl TabQuery for ChromeTransport {
    async fn active_tab(&self) -> anyhow::Result<Option<TabInfo>> {
        let tabs = query_tabs(active_tab_filter()).await?;
        Ok(tabs.into_iter().next())
    }
}
