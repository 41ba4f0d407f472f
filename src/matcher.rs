//! Whitelist/blacklist matching for packages, paths and jar names.
//!
//! `WhiteBlackList` is the primitive: exact strings plus `*` globs, matched
//! whole-string, by path prefix, or by leaf name. `ScanSpec` layers the
//! directory-descent logic on top: it turns whitelisted packages and
//! individually whitelisted classes into relative-path prefixes and answers
//! the per-directory match status the element scanners key off.

use std::collections::HashSet;

use anyhow::{Result, bail};
use once_cell::sync::OnceCell;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Exact string or glob over the whole string.
    WholeString,
    /// Path-prefix match; globs are rejected.
    Prefix,
    /// Match against the final path segment (jar filenames).
    Leafname,
}

#[derive(Debug)]
struct ListEntry {
    source: String,
    /// Compiled lazily on first match; only the glob source is persisted.
    compiled: Option<OnceCell<Regex>>,
}

impl ListEntry {
    fn new(source: String) -> Self {
        let compiled = source.contains('*').then(OnceCell::new);
        Self { source, compiled }
    }

    fn matches(&self, s: &str) -> bool {
        match &self.compiled {
            None => self.source == s,
            Some(cell) => {
                let re = cell.get_or_init(|| compile_glob(&self.source));
                re.is_match(s)
            }
        }
    }
}

/// `*` becomes `.*`; everything else (including `.`) is matched literally.
fn compile_glob(glob: &str) -> Regex {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for (i, part) in glob.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(part));
    }
    pattern.push('$');
    // The pattern is built from an escaped source, so it always compiles.
    Regex::new(&pattern).unwrap()
}

#[derive(Debug)]
pub struct WhiteBlackList {
    mode: MatchMode,
    whitelist: Vec<ListEntry>,
    blacklist: Vec<ListEntry>,
}

impl WhiteBlackList {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }

    pub fn add_to_whitelist(&mut self, s: &str) -> Result<()> {
        let entry = self.entry(s)?;
        self.whitelist.push(entry);
        self.sort_prefixes();
        Ok(())
    }

    pub fn add_to_blacklist(&mut self, s: &str) -> Result<()> {
        let entry = self.entry(s)?;
        self.blacklist.push(entry);
        self.sort_prefixes();
        Ok(())
    }

    fn entry(&self, s: &str) -> Result<ListEntry> {
        if self.mode == MatchMode::Prefix && s.contains('*') {
            bail!("glob patterns are not allowed in prefix match mode: {s}");
        }
        Ok(ListEntry::new(s.to_string()))
    }

    /// Overlapping prefixes need deterministic first-match resolution:
    /// shorter, lexicographically-first prefixes win ties.
    fn sort_prefixes(&mut self) {
        if self.mode == MatchMode::Prefix {
            self.whitelist.sort_by(|a, b| a.source.cmp(&b.source));
            self.blacklist.sort_by(|a, b| a.source.cmp(&b.source));
        }
    }

    pub fn whitelist_is_empty(&self) -> bool {
        self.whitelist.is_empty()
    }

    fn list_matches(mode: MatchMode, list: &[ListEntry], s: &str) -> bool {
        let candidate = match mode {
            MatchMode::Leafname => s.rsplit('/').next().unwrap_or(s),
            _ => s,
        };
        match mode {
            MatchMode::Prefix => list.iter().any(|e| candidate.starts_with(&e.source)),
            _ => list.iter().any(|e| e.matches(candidate)),
        }
    }

    /// True if the whitelist is empty or the string matches it.
    pub fn is_whitelisted(&self, s: &str) -> bool {
        self.whitelist.is_empty() || Self::list_matches(self.mode, &self.whitelist, s)
    }

    /// True only when a non-empty whitelist matches the string.
    pub fn is_specifically_whitelisted(&self, s: &str) -> bool {
        !self.whitelist.is_empty() && Self::list_matches(self.mode, &self.whitelist, s)
    }

    pub fn is_blacklisted(&self, s: &str) -> bool {
        Self::list_matches(self.mode, &self.blacklist, s)
    }

    pub fn is_whitelisted_and_not_blacklisted(&self, s: &str) -> bool {
        self.is_whitelisted(s) && !self.is_blacklisted(s)
    }

    pub fn is_specifically_whitelisted_and_not_blacklisted(&self, s: &str) -> bool {
        self.is_specifically_whitelisted(s) && !self.is_blacklisted(s)
    }
}

/// Match status of one directory (or jar-entry parent path) relative to the
/// whitelist, driving whether the scanner descends into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Whitelisted,
    AncestorOfWhitelisted,
    /// The directory is the package of an individually whitelisted class.
    AtWhitelistedClassPackage,
    NotWithinWhitelist,
    Blacklisted,
}

impl MatchStatus {
    /// Directories in these states are descended into / enumerated.
    pub fn should_scan(self) -> bool {
        matches!(
            self,
            MatchStatus::Whitelisted
                | MatchStatus::AncestorOfWhitelisted
                | MatchStatus::AtWhitelistedClassPackage
        )
    }
}

/// Scan configuration: whitelisted/blacklisted packages as relative-path
/// prefixes, individually whitelisted classfiles, and a leafname filter for
/// jar files.
#[derive(Debug)]
pub struct ScanSpec {
    /// Package paths with a trailing `/`, sorted (e.g. `com/foo/`).
    whitelisted_path_prefixes: Vec<String>,
    blacklisted_path_prefixes: Vec<String>,
    /// Individually whitelisted classfile paths, e.g. `com/foo/Bar.class`.
    whitelisted_classfile_paths: HashSet<String>,
    /// Package paths of the individually whitelisted classes.
    whitelisted_class_package_paths: HashSet<String>,
    pub jar_filter: WhiteBlackList,
}

impl Default for ScanSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSpec {
    pub fn new() -> Self {
        Self {
            whitelisted_path_prefixes: Vec::new(),
            blacklisted_path_prefixes: Vec::new(),
            whitelisted_classfile_paths: HashSet::new(),
            whitelisted_class_package_paths: HashSet::new(),
            jar_filter: WhiteBlackList::new(MatchMode::Leafname),
        }
    }

    pub fn whitelist_package(&mut self, package: &str) -> &mut Self {
        let prefix = package_to_path_prefix(package);
        self.whitelisted_path_prefixes.push(prefix);
        self.whitelisted_path_prefixes.sort();
        self
    }

    pub fn blacklist_package(&mut self, package: &str) -> &mut Self {
        let prefix = package_to_path_prefix(package);
        self.blacklisted_path_prefixes.push(prefix);
        self.blacklisted_path_prefixes.sort();
        self
    }

    /// Whitelist a single class by fully-qualified name; its classfile
    /// passes even though its package is not whitelisted.
    pub fn whitelist_class(&mut self, class_name: &str) -> &mut Self {
        let path = format!("{}.class", class_name.replace('.', "/"));
        let package_path = match path.rfind('/') {
            Some(i) => format!("{}/", &path[..i]),
            None => String::new(),
        };
        self.whitelisted_classfile_paths.insert(path);
        self.whitelisted_class_package_paths.insert(package_path);
        self
    }

    pub fn scans_everything(&self) -> bool {
        self.whitelisted_path_prefixes.is_empty() && self.whitelisted_classfile_paths.is_empty()
    }

    /// Status of a directory path relative to the whitelist. `dir_path` is
    /// relative to the classpath element root and either empty (the root)
    /// or `/`-terminated.
    pub fn dir_match_status(&self, dir_path: &str) -> MatchStatus {
        debug_assert!(dir_path.is_empty() || dir_path.ends_with('/'));
        if self
            .blacklisted_path_prefixes
            .iter()
            .any(|p| dir_path.starts_with(p.as_str()))
        {
            return MatchStatus::Blacklisted;
        }
        if self.scans_everything() {
            return MatchStatus::Whitelisted;
        }
        if self
            .whitelisted_path_prefixes
            .iter()
            .any(|p| dir_path.starts_with(p.as_str()))
        {
            return MatchStatus::Whitelisted;
        }
        if self.whitelisted_class_package_paths.contains(dir_path) {
            return MatchStatus::AtWhitelistedClassPackage;
        }
        if self
            .whitelisted_path_prefixes
            .iter()
            .chain(self.whitelisted_class_package_paths.iter())
            .any(|p| p.starts_with(dir_path))
        {
            return MatchStatus::AncestorOfWhitelisted;
        }
        MatchStatus::NotWithinWhitelist
    }

    /// Whether a file at `rel_path` is matched, either by whitelisted
    /// package or as a specifically whitelisted classfile.
    pub fn file_is_whitelisted(&self, rel_path: &str) -> bool {
        if self
            .blacklisted_path_prefixes
            .iter()
            .any(|p| rel_path.starts_with(p.as_str()))
        {
            return false;
        }
        if self.scans_everything() {
            return true;
        }
        self.whitelisted_path_prefixes
            .iter()
            .any(|p| rel_path.starts_with(p.as_str()))
            || self.whitelisted_classfile_paths.contains(rel_path)
    }
}

fn package_to_path_prefix(package: &str) -> String {
    if package.is_empty() {
        return String::new();
    }
    format!("{}/", package.replace('.', "/"))
}
