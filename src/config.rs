use crate::error::{Error, Result};
use crate::token::TOKEN_CACHE_FILE;
use aws_config::SdkConfig;
use std::env;
use std::path::{Path, PathBuf};

const AWS_CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";

/// Where this tool reads and writes on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub aws_config_file: PathBuf,
    pub token_cache_file: PathBuf,
}

impl Config {
    /// Fills unset paths from `AWS_CONFIG_FILE` and the home directory.
    pub fn resolve(
        aws_config_file: Option<PathBuf>,
        token_cache_file: Option<PathBuf>,
    ) -> Result<Self> {
        let home = || dirs::home_dir().ok_or(Error::HomeDirUnavailable);
        let aws_config_file = match aws_config_file {
            Some(path) => path,
            None => match env::var_os(AWS_CONFIG_FILE_ENV) {
                Some(path) => PathBuf::from(path),
                None => default_aws_config_file(&home()?),
            },
        };
        let token_cache_file = match token_cache_file {
            Some(path) => path,
            None => default_token_cache_file(&home()?),
        };
        Ok(Self {
            aws_config_file,
            token_cache_file,
        })
    }
}

pub fn default_aws_config_file(home: &Path) -> PathBuf {
    home.join(".aws").join("config")
}

pub fn default_token_cache_file(home: &Path) -> PathBuf {
    home.join(".aws/sso/cache").join(TOKEN_CACHE_FILE)
}

/// Loads the SDK configuration without letting the SDK parse the shared
/// config file, which this tool rewrites and which may carry profiles the
/// SDK rejects.
pub async fn load_sdk_config() -> SdkConfig {
    // https://github.com/awslabs/aws-sdk-rust/issues/699
    let old_var = env::var_os(AWS_CONFIG_FILE_ENV);
    env::set_var(AWS_CONFIG_FILE_ENV, "WORKAROUND_ISSUE_699");
    let aws_config = aws_config::load_from_env().await;
    match old_var {
        Some(cfg_file) => env::set_var(AWS_CONFIG_FILE_ENV, cfg_file),
        None => env::remove_var(AWS_CONFIG_FILE_ENV),
    }
    aws_config
}
