//! Output formatting for CLI commands

use crate::notification::NotificationResponse;
use serde::Serialize;

/// Format output as pretty or compact JSON
pub fn format_output<T: Serialize>(data: &T, pretty: bool) -> String {
    let result = if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    };
    result.unwrap_or_else(|_| "{}".to_string())
}

/// Format a send result
pub fn format_response(response: &NotificationResponse, pretty: bool) -> String {
    format_output(response, pretty)
}
