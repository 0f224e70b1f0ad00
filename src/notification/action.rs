//! Action buttons
//!
//! Kept as typed records internally and rendered to ntfy's flat header
//! format only at the edge:
//!
//! ```text
//! http, Yes, https://ntfy.sh/topic, body=YES; view, Open, https://example.com
//! ```
//!
//! Fields containing `,` `;` or quotes are quoted so they cannot break the
//! header apart. A field with both quote kinds is single-quoted and its `'`
//! characters are backslash-escaped; nothing is dropped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Open a URL on the device
    View { label: String, url: String },
    /// Fire an HTTP request from the device (POST unless `method` is set)
    Http {
        label: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
}

impl Action {
    pub fn view(label: impl Into<String>, url: impl Into<String>) -> Self {
        Action::View {
            label: label.into(),
            url: url.into(),
        }
    }

    /// A reply button that posts the option's canonical value back to `topic_url`
    pub fn reply(option: &str, topic_url: &str) -> Self {
        Action::Http {
            label: option.to_string(),
            url: topic_url.to_string(),
            method: None,
            body: Some(canonical_value(option)),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Action::View { label, .. } | Action::Http { label, .. } => label,
        }
    }

    /// Render a single action in ntfy's short format
    pub fn to_header_value(&self) -> String {
        match self {
            Action::View { label, url } => {
                format!("view, {}, {}", quote_field(label), quote_field(url))
            }
            Action::Http {
                label,
                url,
                method,
                body,
            } => {
                let mut parts = vec![
                    "http".to_string(),
                    quote_field(label),
                    quote_field(url),
                ];
                if let Some(method) = method {
                    parts.push(format!("method={}", quote_field(method)));
                }
                if let Some(body) = body {
                    parts.push(format!("body={}", quote_field(body)));
                }
                parts.join(", ")
            }
        }
    }
}

/// Render a list of actions for the `Actions` header
pub fn actions_header(actions: &[Action]) -> Option<String> {
    if actions.is_empty() {
        return None;
    }
    Some(
        actions
            .iter()
            .map(Action::to_header_value)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// `"Not now"` -> `"NOT_NOW"`
pub fn canonical_value(option: &str) -> String {
    option.trim().to_uppercase().replace(' ', "_")
}

fn quote_field(field: &str) -> String {
    if !field.contains([',', ';', '"', '\'']) {
        return field.to_string();
    }
    if field.contains('"') {
        format!("'{}'", field.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        format!("\"{}\"", field)
    }
}
