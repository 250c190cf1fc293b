//! Command-line definition.

use clap::{Parser, Subcommand};
use courier_core::ReplyMode;

/// Drive a mail client's backends from the command line.
#[derive(Debug, Parser)]
#[command(name = "courier")]
#[command(about = "Drafts and replies across Gmail, Graph and the client's own backend")]
#[command(version)]
pub struct Args {
    /// Account to act as; any usable one when unset
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Debugging port of the live client (overrides the config file)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

/// What the driver was asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print cached account emails
    Accounts,

    /// List drafts across every source of an account
    Drafts {
        /// Page size
        #[arg(long, default_value_t = 25)]
        limit: usize,

        /// Drafts to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Print the reply plan for a thread; send it when --body is given
    Reply {
        /// Gmail thread or Graph conversation id
        thread_id: String,

        /// reply, reply-all or forward
        #[arg(default_value = "reply")]
        mode: ReplyMode,

        /// Forward target (repeatable)
        #[arg(long = "to")]
        to: Vec<String>,

        /// Text to send; without it the plan is only printed
        #[arg(long)]
        body: Option<String>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("courier").chain(argv.iter().copied()))
    }

    #[test]
    fn definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn drafts_with_paging() {
        let args = parse(&["--account", "me@x.com", "drafts", "--limit", "5", "--offset", "10"])
            .unwrap();
        assert_eq!(args.account.as_deref(), Some("me@x.com"));
        assert_eq!(args.command, Command::Drafts { limit: 5, offset: 10 });
    }

    #[test]
    fn drafts_defaults() {
        let args = parse(&["drafts"]).unwrap();
        assert_eq!(args.command, Command::Drafts { limit: 25, offset: 0 });
    }

    #[test]
    fn forward_collects_targets() {
        let args = parse(&["reply", "t1", "forward", "--to", "a@x.com", "--to", "b@x.com"]).unwrap();
        assert_eq!(
            args.command,
            Command::Reply {
                thread_id: "t1".into(),
                mode: ReplyMode::Forward,
                to: vec!["a@x.com".into(), "b@x.com".into()],
                body: None,
            }
        );
    }

    #[test]
    fn reply_mode_defaults_to_reply() {
        let args = parse(&["reply", "t1", "--port", "9444"]).unwrap();
        assert_eq!(args.port, Some(9444));
        assert!(matches!(args.command, Command::Reply { mode: ReplyMode::Reply, .. }));
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["drafts", "--limit"]).is_err());
        assert!(parse(&["reply", "t1", "sideways"]).is_err());
        assert!(parse(&["accounts", "extra"]).is_err());
        assert!(parse(&["--verbose", "accounts"]).is_err());
    }
}
