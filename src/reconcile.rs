use crate::directory::{Account, Enumerator, Role, SsoDirectory};
use crate::error::{Error, Result};
use crate::profiles::{profile_name, section_name, ProfileStore};
use crate::token::TokenSource;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

pub const DEFAULT_PREFIX: &str = "sso";

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Lower-cases `value` and turns each run of whitespace into a single hyphen.
pub fn slugify(value: &str) -> String {
    whitespace()
        .replace_all(value.trim(), "-")
        .to_lowercase()
}

/// `<prefix>-<account>-<role>`, skipping empty components.
pub fn profile_key(prefix: &str, account_name: &str, role_name: &str) -> String {
    [prefix.to_owned(), slugify(account_name), slugify(role_name)]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A change reported while the plan is being built.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Change<'a> {
    Add(&'a str),
    Remove(&'a str),
}

impl fmt::Display for Change<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Add(key) => write!(f, "Adding profile: {key}"),
            Change::Remove(key) => write!(f, "Removing profile: {key}"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Addition {
    pub key: String,
    pub attributes: Vec<(&'static str, String)>,
}

/// Two distinct account/role pairs that slug to the same profile key.
#[derive(Debug, PartialEq, Clone)]
pub struct Collision {
    pub key: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct SyncPlan {
    pub additions: Vec<Addition>,
    pub removals: Vec<String>,
    pub collisions: Vec<Collision>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    pub fn apply(&self, store: &mut ProfileStore) {
        for addition in &self.additions {
            store.set(
                &section_name(&addition.key),
                addition.attributes.iter().cloned(),
            );
        }
        for key in &self.removals {
            store.delete(&section_name(key));
        }
    }
}

fn origin(account: &Account, role: &Role) -> String {
    format!("{}/{}", account.id, role.name)
}

/// Computes the profile additions and removals that make the managed
/// profiles under `prefix` match what the SSO portal currently grants.
///
/// Profiles that already exist are never rewritten; only membership is
/// reconciled.
pub struct Reconciler<'a> {
    prefix: &'a str,
    strict: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            strict: false,
        }
    }

    /// Fail instead of warning when two account/role pairs share a key.
    pub fn set_strict(mut self, value: bool) -> Self {
        self.strict = value;
        self
    }

    pub async fn plan<D, T, F>(
        &self,
        store: &ProfileStore,
        enumerator: &Enumerator<D, T>,
        mut report: F,
    ) -> Result<SyncPlan>
    where
        D: SsoDirectory,
        T: TokenSource,
        F: FnMut(Change<'_>),
    {
        // An empty prefix would claim every `profile -...` section and let
        // keys merge into unrelated profiles.
        if self.prefix.is_empty() {
            return Err(Error::EmptyPrefix);
        }
        let existing: BTreeSet<String> = store
            .sections_with_prefix(self.prefix)
            .iter()
            .filter_map(|section| profile_name(section))
            .map(String::from)
            .collect();

        let mut plan = SyncPlan::default();
        let mut valid: HashMap<String, String> = HashMap::new();

        let mut accounts = enumerator.list_accounts().await?;
        while let Some(account) = accounts.next().await? {
            let mut roles = enumerator.list_roles(&account.id).await?;
            while let Some(role) = roles.next().await? {
                let key = profile_key(self.prefix, &account.name, &role.name);
                let origin = origin(&account, &role);

                if let Some(first) = valid.insert(key.clone(), origin.clone()) {
                    if first != origin {
                        warn!(key = %key, first = %first, second = %origin, "Profile key collision");
                        if self.strict {
                            return Err(Error::ProfileCollision {
                                key,
                                first,
                                second: origin,
                            });
                        }
                        plan.collisions.push(Collision {
                            key: key.clone(),
                            first,
                            second: origin,
                        });
                    }
                }

                if existing.contains(&key) {
                    continue;
                }

                let attributes = vec![
                    ("sso_start_url", enumerator.start_url().to_owned()),
                    ("sso_account_id", account.id.clone()),
                    ("sso_role_name", role.name.clone()),
                    ("sso_region", enumerator.region().to_owned()),
                    ("region", enumerator.region().to_owned()),
                ];
                match plan.additions.iter_mut().find(|staged| staged.key == key) {
                    Some(staged) => staged.attributes = attributes,
                    None => {
                        info!(profile = %key, "Adding profile");
                        report(Change::Add(&key));
                        plan.additions.push(Addition { key, attributes });
                    }
                }
            }
        }

        for key in existing.into_iter().filter(|key| !valid.contains_key(key)) {
            info!(profile = %key, "Removing profile");
            report(Change::Remove(&key));
            plan.removals.push(key);
        }

        Ok(plan)
    }
}
