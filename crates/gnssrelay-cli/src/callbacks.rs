//! Built-in callbacks for `clioutput = 4`.

use std::io::Write;
use std::sync::Arc;

use gnssrelay_core::{OutputEvent, Representation};
use gnssrelay_server::{CallbackSink, EventCallback};
use serde_json::{Value, json};

use crate::error::{CliError, CliResult};

/// Names accepted as the output target of a callback sink.
pub const BUILTIN_CALLBACKS: &[&str] = &["identity", "json-lines"];

/// Resolve a built-in callback by name.
pub fn callback_sink(name: Option<&str>) -> CliResult<CallbackSink> {
    let name = name.map(str::trim).unwrap_or("identity");
    let callback: EventCallback = match name {
        "identity" => Arc::new(|event: &OutputEvent| emit(&identity_line(event))),
        "json-lines" => Arc::new(|event: &OutputEvent| emit(&json_line(event).to_string())),
        other => {
            return Err(CliError::config(format!(
                "unknown callback '{other}', expected one of: {}",
                BUILTIN_CALLBACKS.join(", ")
            )));
        }
    };
    Ok(CallbackSink::new(format!("callback {name}"), callback))
}

fn emit(line: &str) {
    let mut stdout = std::io::stdout().lock();
    if writeln!(stdout, "{line}").is_err() {
        tracing::debug!("stdout closed, callback output dropped");
    }
}

/// Message identity, or the first rendering for framing events.
fn identity_line(event: &OutputEvent) -> String {
    match (&event.identity, event.representations.first()) {
        (Some(identity), _) => identity.clone(),
        (None, Some(representation)) => representation.to_text(),
        (None, None) => String::new(),
    }
}

/// One JSON object per event.
fn json_line(event: &OutputEvent) -> Value {
    let representations: Vec<Value> = event
        .representations
        .iter()
        .map(|representation| match representation {
            Representation::Parsed(message) => message.to_json(),
            Representation::Json(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            other => Value::String(other.to_text()),
        })
        .collect();
    json!({
        "identity": event.identity,
        "protocol": event.protocol.map(|p| p.as_str()),
        "representations": representations,
    })
}
