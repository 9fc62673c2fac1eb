use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Watch Twitch channels and open each new broadcast once.
#[derive(Parser, Debug)]
#[command(name = "twitch-watch", version, about)]
pub struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "TWITCH_WATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write daily-rotated log files to this directory
    #[arg(long, global = true, env = "TWITCH_WATCH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `twitch_watch=debug`
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Twitch application client id
    #[arg(long, global = true, env = "TWITCH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Twitch application client secret
    #[arg(long, global = true, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll until interrupted. Reads `check`, `stop`, `start`, `status`,
    /// `add <login>`, `remove <login>`, `interval <m> <s>`, `log <filter>` and `quit` from stdin.
    Run {
        /// Log new broadcasts instead of opening the browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Check every watched channel once and print the result
    Check {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Obtain an app access token
    Token {
        /// Exchange credentials even if the cached token is still valid
        #[arg(long)]
        force: bool,
    },

    /// Manage watched channels
    Channels {
        #[command(subcommand)]
        action: ChannelAction,
    },

    /// Set the poll interval
    Interval {
        #[arg(allow_hyphen_values = true)]
        minutes: String,
        #[arg(allow_hyphen_values = true)]
        seconds: String,
    },

    /// Store the client id and secret given with `--client-id`/`--client-secret`
    Credentials {
        /// Write the client secret to the config file
        #[arg(long)]
        save_secret: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChannelAction {
    /// Start watching channels
    Add {
        #[arg(required = true)]
        logins: Vec<String>,
    },
    /// Stop watching channels
    Remove {
        #[arg(required = true)]
        logins: Vec<String>,
    },
    /// List watched channels
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_channel_commands() {
        let args = Args::try_parse_from(["twitch-watch", "channels", "add", "alice", "bob"]).unwrap();
        match args.command {
            Commands::Channels {
                action: ChannelAction::Add { logins },
            } => assert_eq!(logins, vec!["alice", "bob"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let args = Args::try_parse_from([
            "twitch-watch",
            "credentials",
            "--client-id",
            "cid",
            "--client-secret",
            "secret",
            "--save-secret",
        ])
        .unwrap();
        assert_eq!(args.client_id.as_deref(), Some("cid"));
        assert!(matches!(args.command, Commands::Credentials { save_secret: true }));
    }

    #[test]
    fn interval_accepts_raw_text() {
        let args = Args::try_parse_from(["twitch-watch", "interval", "-1", "90"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Interval { ref minutes, ref seconds } if minutes == "-1" && seconds == "90"
        ));
    }
}
