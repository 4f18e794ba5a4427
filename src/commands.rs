use crate::directory::{Enumerator, SsoDirectory};
use crate::error::Result;
use crate::profiles::{is_managed, profile_name, ProfileStore};
use crate::reconcile::{Reconciler, SyncPlan};
use crate::table;
use crate::token::TokenSource;
use std::io::Write;
use std::path::Path;
use tracing::info;

const CHECK_MARK: &str = "\u{2713}";

pub fn list_profiles<W: Write>(aws_config: &Path, prefix: Option<&str>, out: &mut W) -> Result<()> {
    info!(aws_config = %aws_config.display(), prefix = ?prefix, "Listing profiles");
    let store = ProfileStore::load(aws_config)?;

    let rows: Vec<Vec<String>> = store
        .sections()
        .into_iter()
        .filter(|section| prefix.map_or(true, |prefix| is_managed(section, prefix)))
        .filter_map(|section| {
            let properties = store.get(section)?;
            let field = |key: &str| properties.get(key).unwrap_or_default().to_owned();
            Some(vec![
                profile_name(section).unwrap_or(section).to_owned(),
                if properties.contains_key("sso_start_url") {
                    CHECK_MARK.to_owned()
                } else {
                    String::new()
                },
                field("sso_account_id"),
                field("sso_role_name"),
                field("mfa_serial"),
                field("sso_region"),
                field("region"),
            ])
        })
        .collect();

    let headers = [
        "Profile",
        "SSO",
        "Account Id",
        "Role",
        "MFASerial",
        "SSO Region",
        "Region",
    ];
    write!(out, "{}", table::render(&headers, &rows))?;
    Ok(())
}

/// Returns whether the section order changed.
pub fn sort_profiles<W: Write>(aws_config: &Path, dry_run: bool, out: &mut W) -> Result<bool> {
    info!(aws_config = %aws_config.display(), dry_run, "Sorting profiles");
    let store = ProfileStore::load(aws_config)?;
    let changed = !store.is_sorted();
    let sorted = store.sorted();

    if dry_run {
        sorted.render(out)?;
    } else if changed {
        sorted.write(aws_config, false)?;
    } else {
        info!("Profiles already sorted");
    }
    Ok(changed)
}

pub async fn list_accounts<D, T, W>(enumerator: &Enumerator<D, T>, out: &mut W) -> Result<()>
where
    D: SsoDirectory,
    T: TokenSource,
    W: Write,
{
    info!(start_url = enumerator.start_url(), "Listing accounts");
    let mut rows = Vec::new();
    let mut accounts = enumerator.list_accounts().await?;
    while let Some(account) = accounts.next().await? {
        let mut roles = enumerator.list_roles(&account.id).await?;
        while let Some(role) = roles.next().await? {
            rows.push(vec![account.name.clone(), account.id.clone(), role.name]);
        }
    }
    rows.sort_by_cached_key(|row| row[0].to_lowercase());

    write!(
        out,
        "{}",
        table::render(&["Account Name", "Account Id", "Role"], &rows)
    )?;
    Ok(())
}

pub struct SyncOptions<'a> {
    pub aws_config: &'a Path,
    pub prefix: &'a str,
    pub dry_run: bool,
    pub backup: bool,
    pub strict: bool,
}

/// Reconciles managed profiles and writes the result once, at the end.
pub async fn sso_sync<D, T, W>(
    enumerator: &Enumerator<D, T>,
    options: &SyncOptions<'_>,
    out: &mut W,
) -> Result<SyncPlan>
where
    D: SsoDirectory,
    T: TokenSource,
    W: Write,
{
    info!(
        start_url = enumerator.start_url(),
        aws_config = %options.aws_config.display(),
        prefix = options.prefix,
        dry_run = options.dry_run,
        "Syncing sso profiles"
    );
    let mut store = ProfileStore::load(options.aws_config)?;

    let mut reported = Ok(());
    let plan = Reconciler::new(options.prefix)
        .set_strict(options.strict)
        .plan(&store, enumerator, |change| {
            if reported.is_ok() {
                reported = writeln!(out, "{change}");
            }
        })
        .await?;
    reported?;
    for collision in &plan.collisions {
        eprintln!(
            "warning: profile {} is produced by both {} and {}, keeping {}",
            collision.key, collision.first, collision.second, collision.second
        );
    }

    if plan.is_empty() {
        writeln!(out, "No changes to make.")?;
        return Ok(plan);
    }

    plan.apply(&mut store);
    if options.dry_run {
        store.render(out)?;
    } else {
        store.write(options.aws_config, options.backup)?;
        info!(
            added = plan.additions.len(),
            removed = plan.removals.len(),
            "Wrote aws config"
        );
    }
    Ok(plan)
}
