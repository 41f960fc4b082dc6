pub mod commands;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kathir",
    about = "Kathir operator CLI",
    long_about = "Operate the Kathir shopping assistant: migrations, demo catalog, config inspection, and an interactive chat.",
    after_help = "Examples:\n  kathir migrate\n  kathir seed\n  kathir chat --user-id demo-user --budget 200"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo restaurants, meals and demo cart, then verify them")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Chat with the assistant from the terminal using the configured provider")]
    Chat {
        #[arg(long, help = "User the conversation belongs to")]
        user_id: String,
        #[arg(long, help = "Resume an existing session instead of starting a new one")]
        session_id: Option<String>,
        #[arg(long, help = "Session budget in the configured currency")]
        budget: Option<Decimal>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Chat { user_id, session_id, budget } => {
            commands::chat::run(commands::chat::ChatArgs { user_id, session_id, budget })
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rust_decimal::Decimal;

    use super::{Cli, Command};

    #[test]
    fn chat_arguments_parse_budget_as_decimal() {
        let cli = Cli::try_parse_from([
            "kathir",
            "chat",
            "--user-id",
            "demo-user",
            "--session-id",
            "abc",
            "--budget",
            "150.50",
        ])
        .expect("arguments should parse");

        match cli.command {
            Command::Chat { user_id, session_id, budget } => {
                assert_eq!(user_id, "demo-user");
                assert_eq!(session_id.as_deref(), Some("abc"));
                assert_eq!(budget, Some(Decimal::new(15050, 2)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn chat_requires_a_user_id() {
        assert!(Cli::try_parse_from(["kathir", "chat"]).is_err());
    }
}
