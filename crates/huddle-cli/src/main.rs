use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use huddle_cli::cli::commands::{parse_chat_target, resolve_password};
use huddle_cli::cli::{load_config, run_command, CliCommand};
use huddle_core::{ClientConfig, HuddleCore};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Command-line client for Huddle chat")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (defaults to <config dir>/huddle/config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the server base URL
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    SignIn {
        #[arg(long, short = 'e')]
        email: String,
        /// Falls back to $HUDDLE_PASSWORD, then stdin
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account (does not sign in)
    SignUp {
        #[arg(long, short = 'e')]
        email: String,
        #[arg(long, short = 'n')]
        name: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out and wipe locally stored secrets
    SignOut,

    /// Show the signed-in user
    Whoami,

    /// Update display name and color
    Profile {
        #[arg(long, short = 'n')]
        name: String,
        #[arg(long)]
        color: Option<String>,
    },

    /// List groups, pinned first
    Groups,

    /// List direct messages, pinned first
    Dms,

    /// Print the messages of a chat
    Messages {
        /// group:<id> or dm:<id>
        chat: String,
    },

    /// Send a message to a chat
    Send {
        /// group:<id> or dm:<id>
        chat: String,
        /// Message content
        #[arg(default_value = "")]
        content: String,
        /// URL of an uploaded attachment (can be specified multiple times)
        #[arg(long, short = 'a')]
        attach: Vec<String>,
    },

    /// Toggle the pinned state of a chat
    Pin {
        /// group:<id> or dm:<id>
        chat: String,
    },

    /// Join a group by invite code
    Join { invite_code: String },

    /// Create a new group
    CreateGroup {
        #[arg(long, short = 'n')]
        name: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Open a direct conversation with a user
    StartDm { user_id: String },

    /// Show a group's details before joining
    Preview { invite_code: String },

    /// Toggle notifications for a group
    Mute { group_id: String },

    /// Show notification settings and muted groups
    Notifications,

    /// Follow a chat and print new messages until Ctrl-C
    Watch {
        /// group:<id> or dm:<id>
        chat: String,
    },
}

impl Commands {
    fn into_command(self) -> Result<CliCommand> {
        Ok(match self {
            Commands::SignIn { email, password } => CliCommand::SignIn {
                email,
                password: resolve_password(password)?,
            },
            Commands::SignUp { email, name, password } => CliCommand::SignUp {
                email,
                name,
                password: resolve_password(password)?,
            },
            Commands::SignOut => CliCommand::SignOut,
            Commands::Whoami => CliCommand::WhoAmI,
            Commands::Profile { name, color } => CliCommand::UpdateProfile { name, color },
            Commands::Groups => CliCommand::Groups,
            Commands::Dms => CliCommand::Dms,
            Commands::Messages { chat } => CliCommand::Messages {
                chat: parse_chat_target(&chat)?,
            },
            Commands::Send { chat, content, attach } => CliCommand::Send {
                chat: parse_chat_target(&chat)?,
                content,
                attachments: attach,
            },
            Commands::Pin { chat } => CliCommand::Pin {
                chat: parse_chat_target(&chat)?,
            },
            Commands::Join { invite_code } => CliCommand::Join { invite_code },
            Commands::CreateGroup { name, description } => {
                CliCommand::CreateGroup { name, description }
            }
            Commands::StartDm { user_id } => CliCommand::StartDm { user_id },
            Commands::Preview { invite_code } => CliCommand::Preview { invite_code },
            Commands::Mute { group_id } => CliCommand::Mute { group_id },
            Commands::Notifications => CliCommand::Notifications,
            Commands::Watch { chat } => CliCommand::Watch {
                chat: parse_chat_target(&chat)?,
            },
        })
    }
}

fn main() {
    huddle_core::tracing_setup::init_tracing();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("No command specified. Use --help for usage.");
        std::process::exit(1);
    };

    let result = load_config(cli.config.as_deref(), cli.base_url.as_deref())
        .and_then(|config| Ok((config, command.into_command()?)))
        .and_then(|(config, command)| run(config, command, cli.pretty));

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(config: ClientConfig, command: CliCommand, pretty: bool) -> Result<()> {
    let core = HuddleCore::from_config(config)?;
    run_command(&core, command, pretty).await
}
