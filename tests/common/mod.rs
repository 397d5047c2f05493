//! Common test utilities and fixtures

use serde_json::{json, Value};

/// Build one Graph message JSON object with all fields present.
pub fn graph_message(received: &str, sender: &str, subject: &str, is_read: bool) -> Value {
    json!({
        "receivedDateTime": received,
        "from": { "emailAddress": { "name": "Test Sender", "address": sender } },
        "subject": subject,
        "bodyPreview": format!("Preview for {}", subject),
        "isRead": is_read
    })
}

/// Build a Graph messages page; `next_link` becomes `@odata.nextLink`.
pub fn message_page(messages: Vec<Value>, next_link: Option<String>) -> Value {
    let mut page = json!({ "value": messages });
    if let Some(link) = next_link {
        page["@odata.nextLink"] = json!(link);
    }
    page
}

/// Build a Graph mailFolders page from (id, displayName) pairs.
pub fn folder_page(folders: &[(&str, &str)]) -> Value {
    json!({
        "value": folders
            .iter()
            .map(|(id, name)| json!({ "id": id, "displayName": name }))
            .collect::<Vec<_>>()
    })
}
