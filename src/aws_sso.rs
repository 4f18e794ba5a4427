use crate::directory::{Account, Page, Role, SsoDirectory};
use crate::error::{Error, Result};
use crate::token::{DeviceAuthorizer, PendingAuthorization, PollOutcome};
use aws_config::SdkConfig;
use aws_sdk_sso::config::Region;
use aws_sdk_sso::error::SdkError;
use tracing::{debug, warn};

const CLIENT_NAME: &str = "profile_manager";
const CLIENT_TYPE: &str = "public";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Device authorization against the AWS SSO OIDC service.
pub struct OidcAuthorizer {
    aws_config: SdkConfig,
}

impl OidcAuthorizer {
    pub fn new(aws_config: SdkConfig) -> Self {
        Self { aws_config }
    }

    fn client(&self, region: &str) -> aws_sdk_ssooidc::Client {
        let config = aws_sdk_ssooidc::config::Builder::from(&self.aws_config)
            .region(Region::new(region.to_owned()))
            .build();
        aws_sdk_ssooidc::Client::from_conf(config)
    }
}

fn required(value: Option<&str>, operation: &'static str, field: &str) -> Result<String> {
    value.map(String::from).ok_or_else(|| Error::Network {
        operation,
        message: format!("response is missing `{field}`"),
    })
}

impl DeviceAuthorizer for OidcAuthorizer {
    async fn authorize(&self, start_url: &str, region: &str) -> Result<PendingAuthorization> {
        let client = self.client(region);

        let register = client
            .register_client()
            .client_name(CLIENT_NAME)
            .client_type(CLIENT_TYPE)
            .send()
            .await
            .map_err(|err| Error::network("RegisterClient", &err))?;
        let client_id = required(register.client_id(), "RegisterClient", "clientId")?;
        let client_secret = required(register.client_secret(), "RegisterClient", "clientSecret")?;
        debug!(client_id = %client_id, "Registered oidc client");

        let device_auth = client
            .start_device_authorization()
            .client_id(&client_id)
            .client_secret(&client_secret)
            .start_url(start_url)
            .send()
            .await
            .map_err(|err| Error::network("StartDeviceAuthorization", &err))?;

        Ok(PendingAuthorization {
            region: region.to_owned(),
            device_code: required(
                device_auth.device_code(),
                "StartDeviceAuthorization",
                "deviceCode",
            )?,
            verification_uri: required(
                device_auth.verification_uri_complete(),
                "StartDeviceAuthorization",
                "verificationUriComplete",
            )?,
            client_id,
            client_secret,
        })
    }

    async fn poll(&self, pending: &PendingAuthorization) -> Result<PollOutcome> {
        let response = self
            .client(&pending.region)
            .create_token()
            .client_id(&pending.client_id)
            .client_secret(&pending.client_secret)
            .grant_type(DEVICE_CODE_GRANT)
            .device_code(&pending.device_code)
            .send()
            .await;

        match response {
            Ok(token) => Ok(PollOutcome::Granted {
                access_token: required(token.access_token(), "CreateToken", "accessToken")?,
                expires_in: i64::from(token.expires_in()),
            }),
            Err(SdkError::ServiceError(err)) => {
                let err = err.into_err();
                if err.is_authorization_pending_exception() || err.is_slow_down_exception() {
                    Ok(PollOutcome::Pending)
                } else if err.is_expired_token_exception() {
                    Err(Error::AuthorizationExpired)
                } else {
                    Err(Error::AuthorizationFailed(err.to_string()))
                }
            }
            Err(err) => Err(Error::network("CreateToken", &err)),
        }
    }
}

/// Account and role listing through the AWS SSO portal API.
pub struct SdkDirectory {
    client: aws_sdk_sso::Client,
}

impl SdkDirectory {
    pub fn new(aws_config: &SdkConfig, region: &str) -> Self {
        let config = aws_sdk_sso::config::Builder::from(aws_config)
            .region(Region::new(region.to_owned()))
            .build();
        Self {
            client: aws_sdk_sso::Client::from_conf(config),
        }
    }
}

impl SsoDirectory for SdkDirectory {
    async fn account_page(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>> {
        let output = self
            .client
            .list_accounts()
            .access_token(access_token)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|err| Error::network("ListAccounts", &err))?;

        let items = output
            .account_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|account| match (account.account_id(), account.account_name()) {
                (Some(id), Some(name)) => Some(Account {
                    id: id.to_owned(),
                    name: name.to_owned(),
                }),
                _ => {
                    warn!(account = ?account, "Skipping account without id or name");
                    None
                }
            })
            .collect();
        Ok(Page {
            items,
            next_token: output.next_token().map(String::from),
        })
    }

    async fn role_page(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>> {
        let output = self
            .client
            .list_account_roles()
            .access_token(access_token)
            .account_id(account_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|err| Error::network("ListAccountRoles", &err))?;

        let items = output
            .role_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|role| match role.role_name() {
                Some(name) => Some(Role {
                    name: name.to_owned(),
                }),
                None => {
                    warn!(account_id, "Skipping role without a name");
                    None
                }
            })
            .collect();
        Ok(Page {
            items,
            next_token: output.next_token().map(String::from),
        })
    }
}
