//! Paginated enumeration of the accounts and roles an SSO user can reach.
//!
//! [`Enumerator`] asks its [`TokenSource`] for a bearer token once per listing
//! and then walks the provider's pages lazily: a page is only requested when
//! the previous one has been fully consumed.

use crate::error::Result;
use crate::token::TokenSource;
use std::collections::VecDeque;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Role {
    pub name: String,
}

/// One page of a listing plus the token for the following page, if any.
#[derive(Debug, PartialEq, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Remote account/role listing, one page per call.
#[allow(async_fn_in_trait)]
pub trait SsoDirectory {
    async fn account_page(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>>;

    async fn role_page(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>>;
}

pub struct Enumerator<D, T> {
    directory: D,
    tokens: T,
    start_url: String,
    region: String,
}

impl<D: SsoDirectory, T: TokenSource> Enumerator<D, T> {
    pub fn new(directory: D, tokens: T, start_url: &str, region: &str) -> Self {
        Self {
            directory,
            tokens,
            start_url: start_url.to_owned(),
            region: region.to_owned(),
        }
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn list_accounts(&self) -> Result<Accounts<'_, D>> {
        let access_token = self.tokens.get_token(&self.start_url, &self.region).await?;
        Ok(Accounts {
            directory: &self.directory,
            access_token,
            cursor: Cursor::default(),
        })
    }

    pub async fn list_roles(&self, account_id: &str) -> Result<Roles<'_, D>> {
        let access_token = self.tokens.get_token(&self.start_url, &self.region).await?;
        Ok(Roles {
            directory: &self.directory,
            access_token,
            account_id: account_id.to_owned(),
            cursor: Cursor::default(),
        })
    }
}

struct Cursor<T> {
    buffered: VecDeque<T>,
    next_token: Option<String>,
    exhausted: bool,
}

impl<T> Default for Cursor<T> {
    fn default() -> Self {
        Self {
            buffered: VecDeque::new(),
            next_token: None,
            exhausted: false,
        }
    }
}

impl<T> Cursor<T> {
    fn fill(&mut self, page: Page<T>) {
        self.buffered.extend(page.items);
        self.exhausted = page.next_token.is_none();
        self.next_token = page.next_token;
    }
}

pub struct Accounts<'a, D> {
    directory: &'a D,
    access_token: String,
    cursor: Cursor<Account>,
}

impl<D: SsoDirectory> Accounts<'_, D> {
    pub async fn next(&mut self) -> Result<Option<Account>> {
        loop {
            if let Some(account) = self.cursor.buffered.pop_front() {
                return Ok(Some(account));
            }
            if self.cursor.exhausted {
                return Ok(None);
            }
            let page = self
                .directory
                .account_page(&self.access_token, self.cursor.next_token.take())
                .await?;
            self.cursor.fill(page);
        }
    }
}

pub struct Roles<'a, D> {
    directory: &'a D,
    access_token: String,
    account_id: String,
    cursor: Cursor<Role>,
}

impl<D: SsoDirectory> Roles<'_, D> {
    pub async fn next(&mut self) -> Result<Option<Role>> {
        loop {
            if let Some(role) = self.cursor.buffered.pop_front() {
                return Ok(Some(role));
            }
            if self.cursor.exhausted {
                return Ok(None);
            }
            let page = self
                .directory
                .role_page(
                    &self.access_token,
                    &self.account_id,
                    self.cursor.next_token.take(),
                )
                .await?;
            self.cursor.fill(page);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeDirectory, StaticToken};
    use super::*;

    const START_URL: &str = "https://x-abcdef0123.awsapps.com/start";

    fn directory() -> FakeDirectory {
        FakeDirectory::new(2)
            .with_account("111111111111", "Dev", &["Admin", "ReadOnly", "Billing"])
            .with_account("222222222222", "Prod", &["ReadOnly"])
            .with_account("333333333333", "Sandbox", &[])
    }

    #[tokio::test]
    async fn test_accounts_span_pages_in_provider_order() {
        let tokens = StaticToken::default();
        let enumerator = Enumerator::new(directory(), &tokens, START_URL, "us-west-2");

        let mut accounts = enumerator.list_accounts().await.unwrap();
        let mut names = Vec::new();
        while let Some(account) = accounts.next().await.unwrap() {
            names.push(account.name);
        }
        assert_eq!(names, vec!["Dev", "Prod", "Sandbox"]);
        assert_eq!(tokens.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let tokens = StaticToken::default();
        let enumerator = Enumerator::new(directory(), &tokens, START_URL, "us-west-2");

        let mut roles = enumerator.list_roles("111111111111").await.unwrap();
        assert_eq!(enumerator.directory.requests.get(), 0);
        assert_eq!(roles.next().await.unwrap().unwrap().name, "Admin");
        assert_eq!(roles.next().await.unwrap().unwrap().name, "ReadOnly");
        assert_eq!(enumerator.directory.requests.get(), 1);
        assert_eq!(roles.next().await.unwrap().unwrap().name, "Billing");
        assert_eq!(enumerator.directory.requests.get(), 2);
        assert!(roles.next().await.unwrap().is_none());
        assert!(roles.next().await.unwrap().is_none());
        assert_eq!(enumerator.directory.requests.get(), 2);
    }

    #[tokio::test]
    async fn test_account_without_roles() {
        let tokens = StaticToken::default();
        let enumerator = Enumerator::new(directory(), &tokens, START_URL, "us-west-2");

        let mut roles = enumerator.list_roles("333333333333").await.unwrap();
        assert!(roles.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_token_request_per_listing() {
        let tokens = StaticToken::default();
        let enumerator = Enumerator::new(directory(), &tokens, START_URL, "us-west-2");

        let _accounts = enumerator.list_accounts().await.unwrap();
        let _dev = enumerator.list_roles("111111111111").await.unwrap();
        let _prod = enumerator.list_roles("222222222222").await.unwrap();
        assert_eq!(tokens.calls.get(), 3);
    }
}
