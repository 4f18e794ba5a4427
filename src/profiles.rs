use crate::error::{Error, Result};
use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Marker every profile section name starts with in the shared config file.
pub const PROFILE_MARKER: &str = "profile ";

pub fn section_name(profile: &str) -> String {
    format!("{PROFILE_MARKER}{profile}")
}

pub fn profile_name(section: &str) -> Option<&str> {
    section.strip_prefix(PROFILE_MARKER)
}

/// Whether `section` is a profile managed under `prefix` (`profile <prefix>-...`).
pub fn is_managed(section: &str, prefix: &str) -> bool {
    profile_name(section)
        .and_then(|name| name.strip_prefix(prefix))
        .map_or(false, |rest| rest.starts_with('-'))
}

/// In-memory copy of the AWS shared config file.
///
/// Sections and keys keep their file order; nothing touches the disk until
/// [`ProfileStore::write`] is called.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    ini: Ini,
}

impl ProfileStore {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::ConfigNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        Self::parse(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, ini::ParseError> {
        Ok(Self {
            ini: Ini::load_from_str_opt(text, parse_option())?,
        })
    }

    /// Named sections in file order. The unnamed general section is skipped.
    pub fn sections(&self) -> Vec<&str> {
        self.ini.sections().flatten().collect()
    }

    /// Full section names (`profile <prefix>-...`) managed under `prefix`.
    pub fn sections_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        self.sections()
            .into_iter()
            .filter(|section| is_managed(section, prefix))
            .map(String::from)
            .collect()
    }

    pub fn get(&self, section: &str) -> Option<&Properties> {
        self.ini.section(Some(section))
    }

    /// Merges `attributes` into `section`, creating it at the end of the file
    /// when absent. Keys not named in `attributes` are left as they were.
    pub fn set<I, K, V>(&mut self, section: &str, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let properties = self
            .ini
            .entry(Some(section.to_owned()))
            .or_insert_with(Properties::new);
        for (key, value) in attributes {
            properties.insert(key, value);
        }
    }

    pub fn delete(&mut self, section: &str) {
        self.ini.delete(Some(section));
    }

    pub fn is_sorted(&self) -> bool {
        self.sections().windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Copy of the store with sections ordered by their full name.
    pub fn sorted(&self) -> Self {
        let mut names = self.sections();
        names.sort_unstable();
        names.dedup();

        let mut ini = Ini::new();
        if let Some(general) = self.ini.section(None::<String>) {
            *ini.general_section_mut() = general.clone();
        }
        for name in names {
            if let Some(properties) = self.ini.section(Some(name)) {
                ini.entry(Some(name.to_owned()))
                    .or_insert(properties.clone());
            }
        }
        Self { ini }
    }

    pub fn render<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.ini.write_to_opt(writer, write_option())?;
        Ok(())
    }

    /// Serializes the store to `path`, first copying the current file to
    /// `<path>.bak` when `backup` is set.
    pub fn write(&self, path: &Path, backup: bool) -> Result<()> {
        if backup && path.exists() {
            let backup_path = backup_path(path);
            fs::copy(path, &backup_path)?;
            tracing::info!(backup = %backup_path.display(), "Backed up aws config");
        }
        let mut buffer = Vec::new();
        self.render(&mut buffer)?;
        fs::write(path, buffer)?;
        Ok(())
    }
}

// Values are kept verbatim: quotes and backslashes belong to the value.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    }
}

fn write_option() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        kv_separator: " = ",
        ..Default::default()
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}
