//! Connection descriptors for the two file-backed providers.
//!
//! Descriptors are `key=value` pairs separated by `;`. The file spec may
//! start with the `|DataDirectory|` token, which resolves against the
//! configured data directory instead of being taken literally.

use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::config::db::DataDirectory;
use crate::error::DbInfraError;

pub const DATA_DIRECTORY_TOKEN: &str = "|DataDirectory|";

/// Server name used for attached-file stores.
pub const LOCALDB_SERVER: &str = r"(LocalDB)\MSSQLLocalDB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// SQLite file opened in-process.
    EmbeddedFile,
    /// SQL Server LocalDB with an attached `.mdf` file.
    ServerAttachedFile,
}

impl ProviderKind {
    pub fn extension(self) -> &'static str {
        match self {
            ProviderKind::EmbeddedFile => "db",
            ProviderKind::ServerAttachedFile => "mdf",
        }
    }

    /// File name for the n-th scenario of this provider (`SQLite-1.db`, `LocalDB-1.mdf`).
    pub fn scenario_file_name(self, index: u32) -> String {
        let stem = match self {
            ProviderKind::EmbeddedFile => "SQLite",
            ProviderKind::ServerAttachedFile => "LocalDB",
        };
        format!("{stem}-{index}.{}", self.extension())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::EmbeddedFile => f.write_str("embedded-file"),
            ProviderKind::ServerAttachedFile => f.write_str("server-attached-file"),
        }
    }
}

/// How the store location is written into the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `|DataDirectory|<file>`, resolved by the database layer.
    Placeholder,
    /// `<data dir><sep><file>`, spliced in by the caller.
    Literal,
}

/// Build the descriptor string for `file_name` under `data_dir`.
///
/// Server-attached descriptors carry the resolved file path as catalog name,
/// under `Database=` for the placeholder style and `Initial Catalog=` for the
/// literal style.
pub fn build_connection_string(
    provider: ProviderKind,
    style: PathStyle,
    data_dir: &DataDirectory,
    file_name: &str,
) -> String {
    let file_spec = match style {
        PathStyle::Placeholder => format!("{DATA_DIRECTORY_TOKEN}{file_name}"),
        PathStyle::Literal => format!("{}{}{}", data_dir.path().display(), MAIN_SEPARATOR, file_name),
    };
    let file_spec = quote_value(&file_spec);

    match provider {
        ProviderKind::EmbeddedFile => format!("Data Source={file_spec}"),
        ProviderKind::ServerAttachedFile => {
            let resolved = data_dir.path().join(file_name);
            let catalog_key = match style {
                PathStyle::Placeholder => "Database",
                PathStyle::Literal => "Initial Catalog",
            };
            format!(
                "Server={LOCALDB_SERVER};AttachDbFileName={file_spec};{catalog_key}={};Integrated Security=True",
                quote_value(&resolved.display().to_string())
            )
        }
    }
}

/// Quote `value` when it would not survive a round trip through
/// [`ConnectionDescriptor::parse`] as is.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.contains(';')
        || value.starts_with(['"', '\''])
        || value.trim() != value;
    if !needs_quotes {
        return value.to_string();
    }
    let quote = if value.contains('"') { '\'' } else { '"' };
    format!("{quote}{value}{quote}")
}

/// A parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    provider: ProviderKind,
    file_spec: String,
    server: Option<String>,
    catalog: Option<String>,
    integrated_security: bool,
}

impl ConnectionDescriptor {
    pub fn parse(input: &str) -> Result<Self, DbInfraError> {
        let mut data_source = None;
        let mut attach_file = None;
        let mut server = None;
        let mut catalog = None;
        let mut integrated_security = false;

        for segment in split_segments(input)? {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (raw_key, raw_value) = segment.split_once('=').ok_or_else(|| {
                DbInfraError::descriptor(format!("segment '{segment}' is not key=value"))
            })?;
            let key = normalize_key(raw_key);
            if key.is_empty() {
                return Err(DbInfraError::descriptor(format!(
                    "segment '{segment}' has an empty key"
                )));
            }
            let value = unquote(raw_value.trim()).to_string();

            let slot = match key.as_str() {
                "datasource" | "filename" => &mut data_source,
                "attachdbfilename" => &mut attach_file,
                "server" | "addr" | "address" => &mut server,
                "database" | "initialcatalog" => &mut catalog,
                "integratedsecurity" | "trustedconnection" => {
                    integrated_security = parse_bool(&value).ok_or_else(|| {
                        DbInfraError::descriptor(format!(
                            "'{}' expects True/False, got '{value}'",
                            raw_key.trim()
                        ))
                    })?;
                    continue;
                }
                // Pooling, Mode, Cache and friends do not affect the store location.
                _ => continue,
            };

            if slot.replace(value).is_some() {
                return Err(DbInfraError::descriptor(format!(
                    "key '{}' given more than once",
                    raw_key.trim()
                )));
            }
        }

        let is_server = server.is_some() || attach_file.is_some();
        let (provider, file_spec) = match (data_source, attach_file) {
            (Some(_), Some(_)) => {
                return Err(DbInfraError::descriptor(
                    "descriptor mixes 'Data Source' with 'AttachDbFileName'",
                ))
            }
            (Some(_), None) if is_server => {
                return Err(DbInfraError::descriptor(
                    "descriptor mixes 'Data Source' with 'Server'",
                ))
            }
            (Some(spec), None) => (ProviderKind::EmbeddedFile, spec),
            (None, Some(spec)) => (ProviderKind::ServerAttachedFile, spec),
            (None, None) => {
                return Err(DbInfraError::descriptor(
                    "descriptor names no store file ('Data Source' or 'AttachDbFileName')",
                ))
            }
        };

        if file_spec.is_empty() {
            return Err(DbInfraError::descriptor("store file is empty"));
        }
        if file_spec.eq_ignore_ascii_case(":memory:") {
            return Err(DbInfraError::descriptor(
                "in-memory stores leave no artifact on disk",
            ));
        }

        Ok(Self {
            provider,
            file_spec,
            server,
            catalog,
            integrated_security,
        })
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// The store file exactly as written in the descriptor.
    pub fn file_spec(&self) -> &str {
        &self.file_spec
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn integrated_security(&self) -> bool {
        self.integrated_security
    }

    pub fn uses_placeholder(&self) -> bool {
        starts_with_token(&self.file_spec)
    }

    /// Resolve the on-disk artifact path, substituting the placeholder token.
    pub fn resolve_artifact_path(&self, data_dir: &DataDirectory) -> Result<PathBuf, DbInfraError> {
        resolve_file_spec(&self.file_spec, data_dir)
    }
}

/// Resolve a file spec that may start with `|DataDirectory|`.
pub fn resolve_file_spec(file_spec: &str, data_dir: &DataDirectory) -> Result<PathBuf, DbInfraError> {
    if starts_with_token(file_spec) {
        let rest = file_spec[DATA_DIRECTORY_TOKEN.len()..].trim_start_matches(['/', '\\']);
        if rest.is_empty() {
            return Err(DbInfraError::descriptor(
                "placeholder token is not followed by a file name",
            ));
        }
        if rest.contains(DATA_DIRECTORY_TOKEN) {
            return Err(DbInfraError::descriptor(
                "placeholder token may appear only once",
            ));
        }
        return Ok(data_dir.path().join(rest));
    }

    if file_spec
        .to_ascii_lowercase()
        .contains(&DATA_DIRECTORY_TOKEN.to_ascii_lowercase())
    {
        return Err(DbInfraError::descriptor(format!(
            "placeholder token must start the file spec: '{file_spec}'"
        )));
    }

    Ok(Path::new(file_spec).to_path_buf())
}

fn starts_with_token(file_spec: &str) -> bool {
    file_spec
        .get(..DATA_DIRECTORY_TOKEN.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DATA_DIRECTORY_TOKEN))
}

fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split on `;` outside quoted values. A value is quoted when its first
/// non-blank character after `=` is `"` or `'`.
fn split_segments(input: &str) -> Result<Vec<&str>, DbInfraError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut seen_eq = false;
    let mut at_value_start = false;

    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            ';' => {
                segments.push(&input[start..i]);
                start = i + 1;
                seen_eq = false;
                at_value_start = false;
            }
            '=' if !seen_eq => {
                seen_eq = true;
                at_value_start = true;
            }
            '"' | '\'' if at_value_start => {
                quote = Some(c);
                at_value_start = false;
            }
            c if c.is_whitespace() => {}
            _ => at_value_start = false,
        }
    }

    if let Some(q) = quote {
        return Err(DbInfraError::descriptor(format!(
            "unterminated {q} quote in descriptor"
        )));
    }
    segments.push(&input[start..]);
    Ok(segments)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "sspi" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}
