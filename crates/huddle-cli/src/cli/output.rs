use anyhow::{Context, Result};
use huddle_core::models::Message;
use serde::Serialize;

pub fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).context("Failed to serialize output")
    } else {
        serde_json::to_string(value).context("Failed to serialize output")
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    println!("{}", to_json(value, pretty)?);
    Ok(())
}

/// `[HH:MM] name: content (+N attachments)`, local time.
pub fn format_message_line(message: &Message) -> String {
    let time = message
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M");
    let sender = if message.sender.name.is_empty() {
        message.sender.id.as_str()
    } else {
        message.sender.name.as_str()
    };
    let mut line = format!("[{}] {}: {}", time, sender, message.content);
    match message.attachments.len() {
        0 => {}
        1 => line.push_str(" (+1 attachment)"),
        n => line.push_str(&format!(" (+{} attachments)", n)),
    }
    line
}
