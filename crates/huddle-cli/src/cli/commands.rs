use std::collections::HashSet;
use std::io::BufRead;

use anyhow::{anyhow, bail, Context, Result};
use huddle_core::models::{Attachment, ChatTarget, Message};
use huddle_core::{HuddleCore, SyncEvent};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use super::output::{format_message_line, print_json};

/// Environment variable consulted when `--password` is not given.
pub const PASSWORD_ENV: &str = "HUDDLE_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    SignIn { email: String, password: String },
    SignUp { email: String, password: String, name: String },
    SignOut,
    WhoAmI,
    UpdateProfile { name: String, color: Option<String> },
    Groups,
    Dms,
    Messages { chat: ChatTarget },
    Send { chat: ChatTarget, content: String, attachments: Vec<String> },
    Pin { chat: ChatTarget },
    Join { invite_code: String },
    CreateGroup { name: String, description: Option<String> },
    StartDm { user_id: String },
    Preview { invite_code: String },
    Mute { group_id: String },
    Notifications,
    Watch { chat: ChatTarget },
}

impl CliCommand {
    fn requires_session(&self) -> bool {
        !matches!(
            self,
            CliCommand::SignIn { .. }
                | CliCommand::SignUp { .. }
                | CliCommand::SignOut
                | CliCommand::Mute { .. }
                | CliCommand::Notifications
        )
    }
}

/// Parse `group:<id>` or `dm:<id>`.
pub fn parse_chat_target(value: &str) -> Result<ChatTarget> {
    let Some((kind, id)) = value.split_once(':') else {
        bail!("Expected group:<id> or dm:<id>, got '{}'", value);
    };
    let id = id.trim();
    if id.is_empty() {
        bail!("Chat id is empty in '{}'", value);
    }
    match kind.trim().to_ascii_lowercase().as_str() {
        "group" | "g" => Ok(ChatTarget::Group(id.to_string())),
        "dm" | "d" => Ok(ChatTarget::Dm(id.to_string())),
        other => bail!("Unknown chat kind '{}', expected group or dm", other),
    }
}

/// Build an attachment reference from an already-uploaded URL.
pub fn attachment_from_url(url: &str) -> Attachment {
    let name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string);
    Attachment {
        url: url.to_string(),
        name,
        mime_type: None,
        size: None,
    }
}

/// `--password`, then `$HUDDLE_PASSWORD`, then one line from stdin.
pub fn resolve_password(flag: Option<String>) -> Result<String> {
    if let Some(password) = flag {
        return Ok(password);
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn run_command(core: &HuddleCore, command: CliCommand, pretty: bool) -> Result<()> {
    if command.requires_session() && core.start().await.is_none() {
        bail!("Not signed in. Run `huddle sign-in` first.");
    }

    match command {
        CliCommand::SignIn { email, password } => {
            let session = core.auth().sign_in(&email, &password).await?;
            eprintln!("Signed in as {}", session.display_name());
            print_json(&session, pretty)
        }
        CliCommand::SignUp { email, password, name } => {
            core.auth().sign_up(&email, &password, &name).await?;
            print_json(
                &json!({
                    "created": true,
                    "message": "Account created. Check your email to verify it, then sign in.",
                }),
                pretty,
            )
        }
        CliCommand::SignOut => {
            core.sign_out().await;
            print_json(&json!({ "signedOut": true }), pretty)
        }
        CliCommand::WhoAmI => print_json(&core.auth().session(), pretty),
        CliCommand::UpdateProfile { name, color } => {
            let session = core.auth().update_profile(&name, color.as_deref()).await?;
            print_json(&session, pretty)
        }
        CliCommand::Groups => {
            core.chat().fetch_groups().await?;
            print_json(&core.chat().groups(), pretty)
        }
        CliCommand::Dms => {
            core.chat().fetch_dms().await?;
            print_json(&core.chat().dms(), pretty)
        }
        CliCommand::Messages { chat } => {
            let messages = first_poll(core, chat).await?;
            print_json(&messages, pretty)
        }
        CliCommand::Send { chat, content, attachments } => {
            let attachments = attachments.iter().map(|url| attachment_from_url(url)).collect();
            core.chat().set_active_chat(Some(chat));
            let sent = core.chat().send_message(&content, attachments).await;
            core.chat().set_active_chat(None);
            print_json(&sent?, pretty)
        }
        CliCommand::Pin { chat } => {
            core.chat().refresh_all().await?;
            let pinned = core.chat().toggle_pin(&chat).await?;
            print_json(&json!({ "chat": chat, "pinned": pinned }), pretty)
        }
        CliCommand::Join { invite_code } => {
            core.chat().join_group(&invite_code).await?;
            print_json(&core.chat().groups(), pretty)
        }
        CliCommand::CreateGroup { name, description } => {
            let id = core.chat().create_group(&name, description.as_deref()).await?;
            print_json(&json!({ "id": id }), pretty)
        }
        CliCommand::StartDm { user_id } => {
            let id = core.chat().start_dm(&user_id).await?;
            print_json(&json!({ "id": id }), pretty)
        }
        CliCommand::Preview { invite_code } => {
            let preview = core.chat().preview_group(&invite_code).await?;
            print_json(&preview, pretty)
        }
        CliCommand::Mute { group_id } => {
            let muted = core.preferences().toggle_group_mute(&group_id);
            print_json(&json!({ "groupId": group_id, "muted": muted }), pretty)
        }
        CliCommand::Notifications => print_json(
            &json!({
                "settings": core.preferences().settings(),
                "mutedGroups": core.preferences().muted_groups(),
            }),
            pretty,
        ),
        CliCommand::Watch { chat } => watch(core, chat).await,
    }
}

/// Open `chat` and wait for the poller's immediate first fetch.
async fn first_poll(core: &HuddleCore, chat: ChatTarget) -> Result<Vec<Message>> {
    let mut events = core.chat().subscribe();
    core.chat().set_active_chat(Some(chat.clone()));

    let outcome = loop {
        match events.recv().await {
            Ok(SyncEvent::MessagesUpdated(target)) if target == chat => {
                break Ok(core.chat().messages());
            }
            Ok(SyncEvent::MessagesFailed { chat: target, error }) if target == chat => {
                break Err(anyhow!(error));
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break Err(anyhow!("Chat sync stopped")),
        }
    };

    core.chat().set_active_chat(None);
    outcome
}

/// Poll the chat and print each new message once, until Ctrl-C.
async fn watch(core: &HuddleCore, chat: ChatTarget) -> Result<()> {
    let mut events = core.chat().subscribe();
    core.chat().set_active_chat(Some(chat.clone()));
    eprintln!("Watching {} (Ctrl-C to stop)", chat);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed = HashSet::new();

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(SyncEvent::MessagesUpdated(target)) if target == chat => {
                    for message in core.chat().messages() {
                        if printed.insert(message.id.clone()) {
                            println!("{}", format_message_line(&message));
                        }
                    }
                }
                Ok(SyncEvent::MessagesFailed { chat: target, error }) if target == chat => {
                    eprintln!("Refresh failed: {}", error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind sync events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    core.chat().set_active_chat(None);
    Ok(())
}
