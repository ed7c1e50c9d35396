//! idtoken-login - browser OAuth login that prints an identity token

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing::{error, info, warn};

use idtoken_login::{
    Error,
    browser::{BrowserLauncher, ManualBrowser, SystemBrowser},
    cli::{Cli, Command, DEFAULT_CONFIG_FILE, OutputFormat},
    config::Config,
    flow::LoginFlow,
    oauth::decode_id_token,
    output, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads its env-backed arguments
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {e}");
        }
    }

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Decode { ref token }) => run_decode(token, cli.output),
        Some(Command::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "idtoken-login", &mut io::stdout());
            ExitCode::SUCCESS
        }
        Some(Command::Login) | None => run_login(&cli).await,
    }
}

/// Report a fatal error with its stage and map it to an exit code
fn fail(e: &Error) -> ExitCode {
    error!(stage = %e.stage(), "{e}");
    eprintln!("✗ Authentication failed ({} stage): {e}", e.stage());
    ExitCode::from(e.exit_code())
}

/// Decode a token given on the command line
fn run_decode(token: &str, format: OutputFormat) -> ExitCode {
    match decode_id_token(token) {
        Ok(identity) => {
            match format {
                OutputFormat::Text => {
                    if let Some(email) = identity.email() {
                        println!("User: {} ({email})", identity.name().unwrap_or("Unknown"));
                    }
                    println!("JWT payload:");
                    println!("{}", output::render_claims(&identity));
                }
                OutputFormat::Json => println!("{}", output::render_claims(&identity)),
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Result<Config, Error> {
    let path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });

    let mut config = Config::load(path.as_deref())?;

    config.apply_overrides(
        cli.redirect_uri.clone(),
        cli.callback_timeout.map(Duration::from_secs),
    );
    config.validate()?;
    Ok(config)
}

/// Run the browser login
async fn run_login(cli: &Cli) -> ExitCode {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        client_id = %config.client.client_id,
        redirect_uri = %config.client.redirect_uri,
        "Starting login"
    );

    if cli.no_browser {
        login(&config, ManualBrowser, cli).await
    } else {
        login(&config, SystemBrowser, cli).await
    }
}

async fn login<B: BrowserLauncher>(config: &Config, browser: B, cli: &Cli) -> ExitCode {
    let mut flow = match LoginFlow::from_config(config, browser) {
        Ok(flow) => flow,
        Err(e) => return fail(&e),
    };

    let result = match flow.run().await {
        Ok(result) => result,
        Err(e) => return fail(&e),
    };

    let userinfo = if cli.userinfo {
        match flow.client().fetch_userinfo(&result.tokens.access_token).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "Userinfo lookup failed");
                eprintln!("⚠ {e}");
                None
            }
        }
    } else {
        None
    };

    match cli.output {
        OutputFormat::Text => {
            print!("{}", output::render_login_text(&result, userinfo.as_ref()));
        }
        OutputFormat::Json => match output::render_login_json(&result, userinfo.as_ref()) {
            Ok(json) => println!("{json}"),
            Err(e) => return fail(&e),
        },
    }

    ExitCode::SUCCESS
}
