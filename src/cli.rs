//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use url::Url;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "client_secret.json";

/// Log in with OAuth 2.0 in the browser and print an identity token
#[derive(Parser, Debug)]
#[command(name = "idtoken-login")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (client-secrets JSON or YAML)
    #[arg(short, long, env = "IDTOKEN_LOGIN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Redirect URI registered with the provider (sets callback port and path)
    #[arg(long)]
    pub redirect_uri: Option<Url>,

    /// Seconds to wait for the browser redirect
    #[arg(long, value_name = "SECONDS")]
    pub callback_timeout: Option<u64>,

    /// Print the authorization URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Also fetch and print the userinfo profile
    #[arg(long)]
    pub userinfo: bool,

    /// Output format for the result
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "IDTOKEN_LOGIN_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "IDTOKEN_LOGIN_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to login)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the browser login (default)
    Login,

    /// Decode an existing ID token and print its claims (no verification)
    Decode {
        /// The ID token (JWT)
        #[arg(required = true)]
        token: String,
    },

    /// Print a shell completion script
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Result output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_login() {
        let cli = Cli::try_parse_from(["idtoken-login"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.output, OutputFormat::Text);
        assert!(!cli.no_browser);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn parses_login_overrides() {
        let cli = Cli::try_parse_from([
            "idtoken-login",
            "--redirect-uri",
            "http://localhost:9000/cb",
            "--callback-timeout",
            "60",
            "--no-browser",
            "--userinfo",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(
            cli.redirect_uri.map(|u| u.to_string()),
            Some("http://localhost:9000/cb".to_string())
        );
        assert_eq!(cli.callback_timeout, Some(60));
        assert!(cli.no_browser);
        assert!(cli.userinfo);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["idtoken-login", "decode", "a.b.c"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Decode { token }) if token == "a.b.c"));
    }

    #[test]
    fn rejects_invalid_redirect_uri() {
        assert!(Cli::try_parse_from(["idtoken-login", "--redirect-uri", "not a url"]).is_err());
    }
}
