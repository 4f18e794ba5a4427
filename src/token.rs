use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// File name of the single cache slot under `~/.aws/sso/cache`.
pub const TOKEN_CACHE_FILE: &str = "profile_manager_token.json";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the token cache file holds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    /// Absolute unix timestamp in seconds.
    pub expires: f64,
    pub token: String,
}

impl CachedToken {
    pub fn from_expires_in(token: String, expires_in: i64) -> Self {
        Self {
            expires: now() + expires_in as f64,
            token,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.expires > now()
    }
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// A device authorization that is waiting for the user to approve it.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub region: String,
    pub client_id: String,
    pub client_secret: String,
    pub device_code: String,
    pub verification_uri: String,
}

#[derive(Debug, PartialEq, Clone)]
pub enum PollOutcome {
    Pending,
    Granted { access_token: String, expires_in: i64 },
}

/// The identity provider's side of the device authorization flow.
#[allow(async_fn_in_trait)]
pub trait DeviceAuthorizer {
    /// Registers a public client and starts a device authorization for `start_url`.
    async fn authorize(&self, start_url: &str, region: &str) -> Result<PendingAuthorization>;

    /// Asks once whether the user approved `pending`.
    async fn poll(&self, pending: &PendingAuthorization) -> Result<PollOutcome>;
}

/// Anything that can hand out a bearer token for the SSO portal API.
#[allow(async_fn_in_trait)]
pub trait TokenSource {
    async fn get_token(&self, start_url: &str, region: &str) -> Result<String>;
}

/// File backed token cache with a single slot shared by every start url.
pub struct TokenCache<A> {
    path: PathBuf,
    authorizer: A,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    open_browser: bool,
}

impl<A: DeviceAuthorizer> TokenCache<A> {
    pub fn new(path: PathBuf, authorizer: A) -> Self {
        Self {
            path,
            authorizer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            open_browser: true,
        }
    }

    pub fn set_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    /// Bounds the polling loop. `None` polls until the user approves.
    pub fn set_max_wait(mut self, value: Option<Duration>) -> Self {
        self.max_wait = value;
        self
    }

    pub fn set_open_browser(mut self, value: bool) -> Self {
        self.open_browser = value;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cache slot. A missing or unreadable file is a miss.
    pub fn cached(&self) -> Option<CachedToken> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "No cached token");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Ignoring corrupt token cache");
                None
            }
        }
    }

    fn store(&self, token: &CachedToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(token)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    async fn device_flow(&self, start_url: &str, region: &str) -> Result<CachedToken> {
        let pending = self.authorizer.authorize(start_url, region).await?;
        self.present(&pending.verification_uri);

        let poll = self.poll_until_granted(&pending);
        let token = match self.max_wait {
            Some(limit) => tokio::time::timeout(limit, poll)
                .await
                .map_err(|_| Error::AuthorizationTimedOut(limit))??,
            None => poll.await?,
        };
        eprintln!();
        Ok(token)
    }

    async fn poll_until_granted(&self, pending: &PendingAuthorization) -> Result<CachedToken> {
        loop {
            match self.authorizer.poll(pending).await? {
                PollOutcome::Granted {
                    access_token,
                    expires_in,
                } => return Ok(CachedToken::from_expires_in(access_token, expires_in)),
                PollOutcome::Pending => {
                    eprint!(".");
                    let _ = std::io::stderr().flush();
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    fn present(&self, verification_uri: &str) {
        eprintln!("Approve the sign in request at: {verification_uri}");
        if self.open_browser {
            if let Err(err) = open::that(verification_uri) {
                warn!(error = %err, "Failed to open a browser");
            }
        }
    }
}

impl<A: DeviceAuthorizer> TokenSource for TokenCache<A> {
    async fn get_token(&self, start_url: &str, region: &str) -> Result<String> {
        if let Some(cached) = self.cached().filter(CachedToken::is_valid) {
            debug!("Using cached sso token");
            return Ok(cached.token);
        }

        info!(start_url, region, "Starting device authorization");
        let token = self.device_flow(start_url, region).await?;
        self.store(&token)?;
        info!(path = %self.path().display(), "Cached sso token");
        Ok(token.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeAuthorizer {
        authorizations: Cell<usize>,
        polls: Cell<usize>,
        outcomes: RefCell<VecDeque<Result<PollOutcome>>>,
    }

    impl FakeAuthorizer {
        fn with_outcomes(outcomes: Vec<Result<PollOutcome>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes.into()),
                ..Default::default()
            }
        }
    }

    impl DeviceAuthorizer for &FakeAuthorizer {
        async fn authorize(&self, _start_url: &str, region: &str) -> Result<PendingAuthorization> {
            self.authorizations.set(self.authorizations.get() + 1);
            Ok(PendingAuthorization {
                region: region.to_owned(),
                client_id: String::from("FAKE"),
                client_secret: String::from("FAKE"),
                device_code: String::from("FAKE"),
                verification_uri: String::from("https://device.sso.us-west-2.amazonaws.com/"),
            })
        }

        async fn poll(&self, _pending: &PendingAuthorization) -> Result<PollOutcome> {
            self.polls.set(self.polls.get() + 1);
            self.outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(PollOutcome::Pending))
        }
    }

    fn granted(token: &str) -> Result<PollOutcome> {
        Ok(PollOutcome::Granted {
            access_token: String::from(token),
            expires_in: 3600,
        })
    }

    fn cache<'a>(dir: &tempfile::TempDir, fake: &'a FakeAuthorizer) -> TokenCache<&'a FakeAuthorizer> {
        TokenCache::new(dir.path().join("sso/cache").join(TOKEN_CACHE_FILE), fake)
            .set_poll_interval(Duration::ZERO)
            .set_open_browser(false)
    }

    const START_URL: &str = "https://x-abcdef0123.awsapps.com/start";

    #[test]
    fn test_cache_file_format() {
        let cache = serde_json::json!({ "expires": 1700000000.5, "token": "FAKE" });
        let token: CachedToken = serde_json::from_value(cache.clone()).unwrap();
        assert_eq!(token.token, "FAKE");
        assert_eq!(serde_json::to_value(token).unwrap(), cache);
    }

    #[test]
    fn test_expiry_is_strict() {
        let expired = CachedToken {
            expires: now() - 1.0,
            token: String::from("FAKE"),
        };
        assert!(!expired.is_valid());
        assert!(CachedToken::from_expires_in(String::from("FAKE"), 60).is_valid());
    }

    #[tokio::test]
    async fn test_device_flow_persists_token() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::with_outcomes(vec![
            Ok(PollOutcome::Pending),
            Ok(PollOutcome::Pending),
            granted("fresh"),
        ]);
        let cache = cache(&dir, &fake);

        let token = cache.get_token(START_URL, "us-west-2").await.unwrap();
        assert_eq!(token, "fresh");
        assert_eq!(fake.authorizations.get(), 1);
        assert_eq!(fake.polls.get(), 3);

        let stored = cache.cached().unwrap();
        assert_eq!(stored.token, "fresh");
        assert!(stored.is_valid());
    }

    #[tokio::test]
    async fn test_valid_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::with_outcomes(vec![granted("first"), granted("second")]);
        let cache = cache(&dir, &fake);

        assert_eq!(cache.get_token(START_URL, "us-west-2").await.unwrap(), "first");
        assert_eq!(cache.get_token(START_URL, "us-west-2").await.unwrap(), "first");
        assert_eq!(fake.authorizations.get(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_device_flow() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::with_outcomes(vec![granted("renewed")]);
        let cache = cache(&dir, &fake);
        cache
            .store(&CachedToken {
                expires: now() - 10.0,
                token: String::from("stale"),
            })
            .unwrap();

        assert_eq!(cache.get_token(START_URL, "us-west-2").await.unwrap(), "renewed");
        assert_eq!(fake.authorizations.get(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::with_outcomes(vec![granted("recovered")]);
        let cache = cache(&dir, &fake);
        fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        fs::write(cache.path(), "{not json").unwrap();

        assert!(cache.cached().is_none());
        assert_eq!(cache.get_token(START_URL, "us-west-2").await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn test_denied_authorization_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::with_outcomes(vec![
            Ok(PollOutcome::Pending),
            Err(Error::AuthorizationFailed(String::from("access denied"))),
            granted("never"),
        ]);
        let cache = cache(&dir, &fake);

        let err = cache.get_token(START_URL, "us-west-2").await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationFailed(_)));
        assert_eq!(fake.polls.get(), 2);
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn test_polling_respects_max_wait() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeAuthorizer::default();
        let cache = cache(&dir, &fake)
            .set_poll_interval(Duration::from_millis(5))
            .set_max_wait(Some(Duration::from_millis(50)));

        let err = cache.get_token(START_URL, "us-west-2").await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationTimedOut(_)));
        assert!(cache.cached().is_none());
    }
}
