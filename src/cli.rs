use crate::reconcile::DEFAULT_PREFIX;
use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_LOG_FILE: &str = "aws-sso-profiles.log";
pub const DEFAULT_REGION: &str = "us-west-2";

#[derive(Debug, Parser)]
#[command(author, version, about = "Keep AWS config profiles in sync with AWS SSO", long_about = None)]
pub struct Cli {
    /// The log level to use.
    #[arg(long, global = true, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    /// The log file to write to.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
    /// The AWS region to use.
    #[arg(long, global = true, env = "AWS_DEFAULT_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
    /// Where the SSO access token is cached.
    #[arg(long, global = true)]
    pub token_cache: Option<PathBuf>,
    /// Give up waiting for the browser sign in after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub auth_timeout: Option<u64>,
    /// Print the sign in URL instead of opening a browser.
    #[arg(long, global = true)]
    pub no_browser: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Get information about the AWS profiles you have configured.
    ListProfiles(ListProfilesArgs),
    /// Sort your AWS config profiles.
    SortProfiles(SortProfilesArgs),
    /// Get information about the AWS accounts you have access to.
    ListAccounts(ListAccountsArgs),
    /// Sync your SSO based AWS accounts as AWS config profiles.
    SsoSync(SsoSyncArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::ListProfiles(_) => "list-profiles",
            Commands::SortProfiles(_) => "sort-profiles",
            Commands::ListAccounts(_) => "list-accounts",
            Commands::SsoSync(_) => "sso-sync",
        }
    }
}

#[derive(Debug, Args)]
pub struct ListProfilesArgs {
    /// The path to your AWS config file [default: $AWS_CONFIG_FILE or ~/.aws/config]
    #[arg(long)]
    pub aws_config: Option<PathBuf>,
    /// Only show profiles starting with this prefix.
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub prefix: Option<String>,
}

#[derive(Debug, Args)]
pub struct SortProfilesArgs {
    /// The path to your AWS config file [default: $AWS_CONFIG_FILE or ~/.aws/config]
    #[arg(long)]
    pub aws_config: Option<PathBuf>,
    /// Don't actually make any changes.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ListAccountsArgs {
    /// The start URL for your SSO instance.
    #[arg(long, env = "MP_START_URL")]
    pub start_url: String,
}

#[derive(Debug, Args)]
pub struct SsoSyncArgs {
    /// The start URL for your SSO instance.
    #[arg(long, env = "MP_START_URL")]
    pub start_url: String,
    /// The path to your AWS config file [default: $AWS_CONFIG_FILE or ~/.aws/config]
    #[arg(long)]
    pub aws_config: Option<PathBuf>,
    /// String all managed profiles should start with.
    #[arg(long, default_value = DEFAULT_PREFIX, value_parser = NonEmptyStringValueParser::new())]
    pub prefix: String,
    /// Don't actually make any changes.
    #[arg(long)]
    pub dry_run: bool,
    /// Copy the config file to <path>.bak before writing.
    #[arg(long)]
    pub backup: bool,
    /// Fail when two account/role pairs map to the same profile name.
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sso_sync() {
        let cli = Cli::try_parse_from([
            "aws-sso-profiles",
            "--region",
            "eu-west-1",
            "sso-sync",
            "--start-url",
            "https://x-abcdef0123.awsapps.com/start",
            "--dry-run",
            "--log-level",
            "DEBUG",
        ])
        .unwrap();
        assert_eq!(cli.region, "eu-west-1");
        assert_eq!(cli.log_level, LogLevel::Debug);
        match cli.command {
            Commands::SsoSync(args) => {
                assert_eq!(args.start_url, "https://x-abcdef0123.awsapps.com/start");
                assert_eq!(args.prefix, "sso");
                assert!(args.dry_run);
                assert!(!args.backup);
                assert!(args.aws_config.is_none());
            }
            _ => panic!("expected sso-sync"),
        }
    }

    #[test]
    fn test_parse_list_profiles() {
        let cli = Cli::try_parse_from([
            "aws-sso-profiles",
            "list-profiles",
            "--aws-config",
            "/tmp/config",
            "--prefix",
            "corp",
        ])
        .unwrap();
        assert_eq!(cli.command.name(), "list-profiles");
        assert_eq!(cli.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        match cli.command {
            Commands::ListProfiles(args) => {
                assert_eq!(args.aws_config, Some(PathBuf::from("/tmp/config")));
                assert_eq!(args.prefix.as_deref(), Some("corp"));
            }
            _ => panic!("expected list-profiles"),
        }
    }

    #[test]
    fn test_parse_sort_profiles_with_timeout() {
        let cli = Cli::try_parse_from([
            "aws-sso-profiles",
            "--auth-timeout",
            "300",
            "sort-profiles",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.auth_timeout, Some(300));
        assert!(!cli.no_browser);
        assert!(matches!(
            cli.command,
            Commands::SortProfiles(SortProfilesArgs { dry_run: true, .. })
        ));
    }

    #[test]
    fn test_empty_prefix_is_rejected() {
        let sync = Cli::try_parse_from([
            "aws-sso-profiles",
            "sso-sync",
            "--start-url",
            "https://x-abcdef0123.awsapps.com/start",
            "--prefix",
            "",
        ]);
        assert!(sync.is_err());
        let list = Cli::try_parse_from(["aws-sso-profiles", "list-profiles", "--prefix", ""]);
        assert!(list.is_err());
        assert!(Cli::try_parse_from(["aws-sso-profiles", "list-profiles", "--prefix", "corp"]).is_ok());
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["aws-sso-profiles"]).is_err());
    }
}
