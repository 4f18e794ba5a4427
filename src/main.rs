use clap::Parser;
use std::io;
use std::time::Duration;
use tracing::{info_span, Instrument};

mod aws_sso;
mod cli;
mod commands;
mod config;
mod directory;
mod error;
mod logging;
mod profiles;
mod reconcile;
mod table;
mod token;

use aws_sso::{OidcAuthorizer, SdkDirectory};
use cli::{Cli, Commands};
use commands::SyncOptions;
use config::Config;
use directory::Enumerator;
use error::Result;
use token::TokenCache;

type SsoEnumerator = Enumerator<SdkDirectory, TokenCache<OidcAuthorizer>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "Command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_level, &cli.log_file)?;
    let span = info_span!("command", name = cli.command.name());
    dispatch(cli).instrument(span).await
}

async fn dispatch(cli: Cli) -> Result<()> {
    let sso = SsoOptions {
        region: cli.region,
        auth_timeout: cli.auth_timeout.map(Duration::from_secs),
        open_browser: !cli.no_browser,
    };
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::ListProfiles(args) => {
            let config = Config::resolve(args.aws_config, cli.token_cache)?;
            commands::list_profiles(&config.aws_config_file, args.prefix.as_deref(), &mut out)
        }
        Commands::SortProfiles(args) => {
            let config = Config::resolve(args.aws_config, cli.token_cache)?;
            commands::sort_profiles(&config.aws_config_file, args.dry_run, &mut out).map(|_| ())
        }
        Commands::ListAccounts(args) => {
            let config = Config::resolve(None, cli.token_cache)?;
            let enumerator = enumerator(&config, &args.start_url, &sso).await;
            commands::list_accounts(&enumerator, &mut out).await
        }
        Commands::SsoSync(args) => {
            let config = Config::resolve(args.aws_config, cli.token_cache)?;
            let enumerator = enumerator(&config, &args.start_url, &sso).await;
            let options = SyncOptions {
                aws_config: &config.aws_config_file,
                prefix: &args.prefix,
                dry_run: args.dry_run,
                backup: args.backup,
                strict: args.strict,
            };
            commands::sso_sync(&enumerator, &options, &mut out)
                .await
                .map(|_| ())
        }
    }
}

struct SsoOptions {
    region: String,
    auth_timeout: Option<Duration>,
    open_browser: bool,
}

async fn enumerator(config: &Config, start_url: &str, sso: &SsoOptions) -> SsoEnumerator {
    let aws_config = config::load_sdk_config().await;
    let tokens = TokenCache::new(
        config.token_cache_file.clone(),
        OidcAuthorizer::new(aws_config.clone()),
    )
    .set_max_wait(sso.auth_timeout)
    .set_open_browser(sso.open_browser);
    Enumerator::new(
        SdkDirectory::new(&aws_config, &sso.region),
        tokens,
        start_url,
        &sso.region,
    )
}
