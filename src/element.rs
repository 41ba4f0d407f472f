//! Classpath elements: the directory, jar and module variants of "a thing
//! that contributes resources to the scan".
//!
//! The three variants are a closed enum behind one set of operations
//! (`scan_paths`, accessors, `close`) rather than an inheritance chain.
//! Each element owns its enumeration state: matched resources, the subset
//! that are classfiles, per-path last-modified timestamps for change
//! detection, and a skip flag set when the element fails on I/O.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use memmap2::Mmap;
use tempfile::TempPath;
use zip::ZipArchive;

use crate::matcher::{MatchStatus, ScanSpec};
use crate::recycler::{Recyclable, Recycler};

const CLASSFILE_SUFFIX: &str = ".class";

/// An open, memory-mapped jar shared between scanner threads through the
/// session recycler. The archive reader is guarded by a mutex; entry reads
/// decompress fully under the lock.
pub struct JarSlab {
    path: PathBuf,
    archive: Mutex<ZipArchive<Cursor<MmapBytes>>>,
}

struct MmapBytes(Mmap);

impl AsRef<[u8]> for MmapBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl JarSlab {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("cannot open jar: {}", path.display()))?;
        // SAFETY: The file is opened read-only and the mmap lives inside the
        // archive reader, which is dropped before the file handle would be
        // invalidated.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("cannot mmap jar: {}", path.display()))?;
        let archive = ZipArchive::new(Cursor::new(MmapBytes(mmap)))
            .with_context(|| format!("cannot read zip structure: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names in central-directory order, so entries of one directory
    /// arrive clustered together.
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let mut archive = self.archive.lock().expect("jar slab poisoned");
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            names.push(archive.by_index(i)?.name().to_string());
        }
        Ok(names)
    }

    pub fn read_entry(&self, entry_name: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.lock().expect("jar slab poisoned");
        let mut entry = archive
            .by_name(entry_name)
            .with_context(|| format!("no such entry {entry_name} in {}", self.path.display()))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Recyclable for JarSlab {
    // The mapped region is released when the last handle drops; nothing to
    // flush beyond that.
    fn recycle(&self) {}
}

/// A lazily-openable handle to "bytes at a path inside a classpath element".
pub struct Resource {
    /// Path relative to the element root (package root already stripped).
    path: String,
    origin: ResourceOrigin,
    open_flag: AtomicBool,
}

enum ResourceOrigin {
    File(PathBuf),
    JarEntry {
        slab: Arc<JarSlab>,
        entry_name: String,
    },
}

impl Resource {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_classfile(&self) -> bool {
        self.path.ends_with(CLASSFILE_SUFFIX)
    }

    /// True when the resource reads straight from a file on disk. Jar
    /// entries arrive fully decompressed instead.
    pub fn is_file_backed(&self) -> bool {
        matches!(self.origin, ResourceOrigin::File(_))
    }

    /// Open the resource for reading. The returned reader must be dropped
    /// (closed) before the resource can be opened again; double-open is a
    /// usage error.
    pub fn open(&self) -> Result<ResourceReader<'_>> {
        if self.open_flag.swap(true, Ordering::SeqCst) {
            bail!("resource {} is already open", self.path);
        }
        let inner = match &self.origin {
            ResourceOrigin::File(path) => {
                let file = match File::open(path) {
                    Ok(f) => f,
                    Err(e) => {
                        self.open_flag.store(false, Ordering::SeqCst);
                        return Err(e).with_context(|| {
                            format!("cannot open resource file: {}", path.display())
                        });
                    }
                };
                ReaderInner::Stream(BufReader::new(file))
            }
            ResourceOrigin::JarEntry { slab, entry_name } => {
                match slab.read_entry(entry_name) {
                    Ok(bytes) => ReaderInner::Bytes(Cursor::new(bytes)),
                    Err(e) => {
                        self.open_flag.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
        };
        Ok(ResourceReader {
            resource: self,
            inner,
        })
    }

    /// Read the full resource content; the handle is closed implicitly.
    pub fn load(&self) -> Result<Vec<u8>> {
        let mut reader = self.open()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

enum ReaderInner {
    Stream(BufReader<File>),
    Bytes(Cursor<Vec<u8>>),
}

/// Open handle to a resource's bytes; dropping it closes the resource.
pub struct ResourceReader<'a> {
    resource: &'a Resource,
    inner: ReaderInner,
}

impl Read for ResourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ReaderInner::Stream(r) => r.read(buf),
            ReaderInner::Bytes(r) => r.read(buf),
        }
    }
}

impl Drop for ResourceReader<'_> {
    fn drop(&mut self) {
        self.resource.open_flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Unopened,
    Scanning,
    Scanned,
    /// Terminal: the element failed on I/O and is excluded from further
    /// processing.
    SkippedOnError,
}

enum ElementKind {
    Dir {
        root: PathBuf,
    },
    Jar {
        path: PathBuf,
        /// Prefix inside the jar under which real content lives, with a
        /// trailing `/` when non-empty (e.g. `BOOT-INF/classes/`).
        package_root: String,
        /// Entry prefixes claimed by nested-jar elements; enumeration stops
        /// at these so content reachable by two paths is scanned once.
        nested_prefixes: Vec<String>,
        /// Keeps an extracted nested jar alive for the element's lifetime.
        _temp: Option<TempPath>,
    },
    Module {
        name: String,
        location: PathBuf,
    },
}

/// One classpath entry being scanned.
pub struct ClasspathElement {
    kind: ElementKind,
    state: ElementState,
    matched_resources: Vec<Resource>,
    classfile_indices: Vec<usize>,
    timestamps: HashMap<String, SystemTime>,
}

impl ClasspathElement {
    pub fn new_dir(root: PathBuf) -> Self {
        Self::new(ElementKind::Dir { root })
    }

    pub fn new_jar(path: PathBuf, package_root: String, temp: Option<TempPath>) -> Self {
        let package_root = normalize_package_root(package_root);
        Self::new(ElementKind::Jar {
            path,
            package_root,
            nested_prefixes: Vec::new(),
            _temp: temp,
        })
    }

    pub fn new_module(name: String, location: PathBuf) -> Self {
        Self::new(ElementKind::Module { name, location })
    }

    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            state: ElementState::Unopened,
            matched_resources: Vec::new(),
            classfile_indices: Vec::new(),
            timestamps: HashMap::new(),
        }
    }

    /// Stop enumeration at a prefix claimed by a nested-jar element.
    pub fn add_nested_prefix(&mut self, prefix: String) {
        if let ElementKind::Jar { nested_prefixes, .. } = &mut self.kind {
            let mut prefix = prefix;
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            nested_prefixes.push(prefix);
        }
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub fn is_skipped(&self) -> bool {
        self.state == ElementState::SkippedOnError
    }

    /// Human-readable identity for diagnostics.
    pub fn description(&self) -> String {
        match &self.kind {
            ElementKind::Dir { root } => root.display().to_string(),
            ElementKind::Jar {
                path, package_root, ..
            } if package_root.is_empty() => path.display().to_string(),
            ElementKind::Jar {
                path, package_root, ..
            } => format!("{}!/{}", path.display(), package_root),
            ElementKind::Module { name, location } => {
                format!("module {name} ({})", location.display())
            }
        }
    }

    pub fn matched_resources(&self) -> &[Resource] {
        &self.matched_resources
    }

    pub fn classfile_resources(&self) -> impl Iterator<Item = &Resource> {
        self.classfile_indices
            .iter()
            .map(|&i| &self.matched_resources[i])
    }

    /// Relative path to last-modified timestamps for change detection.
    /// Directories that are ancestors of whitelisted paths are included so
    /// a matching subdirectory added later is detected on a future scan.
    pub fn timestamps(&self) -> &HashMap<String, SystemTime> {
        &self.timestamps
    }

    /// Session-wide timestamp key for a path in this element: the physical
    /// location, a single `!/` separator, then the full path from the
    /// location root. The package root already carries its trailing slash.
    pub fn timestamp_key(&self, rel_path: &str) -> String {
        match &self.kind {
            ElementKind::Dir { root } => format!("{}!/{rel_path}", root.display()),
            ElementKind::Jar {
                path, package_root, ..
            } => format!("{}!/{package_root}{rel_path}", path.display()),
            ElementKind::Module { location, .. } => {
                format!("{}!/{rel_path}", location.display())
            }
        }
    }

    /// Enumerate resource paths under the matcher's rules. An I/O failure
    /// marks the element `SkippedOnError` and is recorded as a diagnostic;
    /// it never aborts the overall scan. Calling this twice is a usage
    /// error.
    pub fn scan_paths(
        &mut self,
        spec: &ScanSpec,
        jar_pool: &Recycler<PathBuf, JarSlab>,
    ) -> Result<()> {
        if self.state != ElementState::Unopened {
            bail!(
                "classpath element {} scanned twice (state {:?})",
                self.description(),
                self.state
            );
        }
        self.state = ElementState::Scanning;
        let result = match &self.kind {
            ElementKind::Dir { root } => {
                let root = root.clone();
                self.scan_dir_tree(&root, spec)
            }
            ElementKind::Jar { path, .. } => {
                let path = path.clone();
                self.scan_archive(&path, spec, jar_pool, false)
            }
            ElementKind::Module { name, location } => {
                let name = name.clone();
                let location = location.clone();
                debug!("scanning module {name} at {}", location.display());
                if location.is_dir() {
                    let mut visited = HashSet::new();
                    self.scan_dir_recursive(&location, String::new(), spec, &mut visited, true)
                } else {
                    self.scan_archive(&location, spec, jar_pool, true)
                }
            }
        };
        match result {
            Ok(()) => {
                self.state = ElementState::Scanned;
                Ok(())
            }
            Err(e) => {
                warn!("skipping classpath element {}: {e:#}", self.description());
                self.state = ElementState::SkippedOnError;
                self.matched_resources.clear();
                self.classfile_indices.clear();
                Ok(())
            }
        }
    }

    /// Release per-element state; pooled archive handles are returned to
    /// the session recycler when the resources drop.
    pub fn close(&mut self) {
        self.matched_resources.clear();
        self.classfile_indices.clear();
    }

    fn scan_dir_tree(&mut self, root: &Path, spec: &ScanSpec) -> Result<()> {
        let mut visited = HashSet::new();
        self.scan_dir_recursive(root, String::new(), spec, &mut visited, false)
    }

    /// Depth-first directory walk. `visited` holds canonicalized
    /// (symlink-resolved) directories already seen; revisiting one through
    /// a symlink cycle truncates that branch.
    fn scan_dir_recursive(
        &mut self,
        dir: &Path,
        rel_dir: String,
        spec: &ScanSpec,
        visited: &mut HashSet<PathBuf>,
        is_module: bool,
    ) -> Result<()> {
        let canonical = dir
            .canonicalize()
            .with_context(|| format!("cannot canonicalize dir: {}", dir.display()))?;
        if !visited.insert(canonical) {
            debug!("already visited (symlink cycle?): {}", dir.display());
            return Ok(());
        }

        let status = spec.dir_match_status(&rel_dir);
        if !status.should_scan() {
            return Ok(());
        }
        if let Ok(meta) = dir.metadata()
            && let Ok(mtime) = meta.modified()
        {
            self.timestamps.insert(rel_dir.clone(), mtime);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("cannot read dir: {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                debug!("skipping non-UTF-8 path under {}", dir.display());
                continue;
            };
            let file_type = entry.file_type()?;
            let is_dir = if file_type.is_symlink() {
                entry.path().is_dir()
            } else {
                file_type.is_dir()
            };
            if is_dir {
                let child_rel = format!("{rel_dir}{name}/");
                self.scan_dir_recursive(&entry.path(), child_rel, spec, visited, is_module)?;
            } else {
                let rel_path = format!("{rel_dir}{name}");
                if spec.file_is_whitelisted(&rel_path) {
                    if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                        self.timestamps.insert(rel_path.clone(), mtime);
                    }
                    self.push_resource(
                        rel_path,
                        ResourceOrigin::File(entry.path()),
                        is_module,
                    );
                }
            }
        }
        Ok(())
    }

    /// Flat enumeration of a zip/jar (or modular jar). Entries arrive in
    /// clustered order, so the previous entry's parent-directory status is
    /// cached and reused while the parent does not change.
    fn scan_archive(
        &mut self,
        path: &Path,
        spec: &ScanSpec,
        jar_pool: &Recycler<PathBuf, JarSlab>,
        is_module: bool,
    ) -> Result<()> {
        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let slab = jar_pool.acquire(&key, || JarSlab::open(path))?;
        let mtime = path
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let (package_root, nested_prefixes) = match &self.kind {
            ElementKind::Jar {
                package_root,
                nested_prefixes,
                ..
            } => (package_root.clone(), nested_prefixes.clone()),
            _ => (String::new(), Vec::new()),
        };

        let names = slab.entry_names()?;
        let mut cached_parent: Option<(String, MatchStatus)> = None;
        for entry_name in names {
            if entry_name.ends_with('/') {
                continue;
            }
            let Some(rel_path) = strip_package_root(&entry_name, &package_root) else {
                continue;
            };
            if nested_prefixes.iter().any(|p| rel_path.starts_with(p.as_str())) {
                continue;
            }

            let parent = match rel_path.rfind('/') {
                Some(i) => &rel_path[..=i],
                None => "",
            };
            let status = match &cached_parent {
                Some((cached, status)) if cached.as_str() == parent => *status,
                _ => {
                    let status = spec.dir_match_status(parent);
                    cached_parent = Some((parent.to_string(), status));
                    status
                }
            };
            let matched = match status {
                MatchStatus::Whitelisted => true,
                MatchStatus::AtWhitelistedClassPackage => spec.file_is_whitelisted(rel_path),
                _ => false,
            };
            if !matched {
                continue;
            }
            let rel_path = rel_path.to_string();
            self.timestamps.insert(rel_path.clone(), mtime);
            self.push_resource(
                rel_path,
                ResourceOrigin::JarEntry {
                    slab: slab.clone(),
                    entry_name,
                },
                is_module,
            );
        }
        jar_pool.release(slab);
        Ok(())
    }

    fn push_resource(&mut self, rel_path: String, origin: ResourceOrigin, is_module: bool) {
        let is_classfile = rel_path.ends_with(CLASSFILE_SUFFIX)
            // Module descriptors are file matches but never class
            // candidates.
            && !(is_module && rel_path == "module-info.class");
        let resource = Resource {
            path: rel_path,
            origin,
            open_flag: AtomicBool::new(false),
        };
        self.matched_resources.push(resource);
        if is_classfile {
            self.classfile_indices.push(self.matched_resources.len() - 1);
        }
    }
}

fn normalize_package_root(mut root: String) -> String {
    while root.starts_with('/') {
        root.remove(0);
    }
    if !root.is_empty() && !root.ends_with('/') {
        root.push('/');
    }
    root
}

fn strip_package_root<'a>(entry_name: &'a str, package_root: &str) -> Option<&'a str> {
    if package_root.is_empty() {
        Some(entry_name)
    } else {
        entry_name.strip_prefix(package_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_scanner_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        use zip::write::FileOptions;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn spec_for_package(package: &str) -> ScanSpec {
        let mut spec = ScanSpec::new();
        spec.whitelist_package(package);
        spec
    }

    #[test]
    fn dir_scan_matches_only_whitelisted_package() {
        let root = temp_dir("dir_scan");
        write_file(&root.join("com/foo/Bar.class"), b"xx");
        write_file(&root.join("com/foo/data.txt"), b"yy");
        write_file(&root.join("com/bar/Baz.class"), b"zz");

        let spec = spec_for_package("com.foo");
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(root.clone());
        element.scan_paths(&spec, &pool).unwrap();

        assert_eq!(element.state(), ElementState::Scanned);
        let mut paths: Vec<&str> = element
            .matched_resources()
            .iter()
            .map(|r| r.path())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["com/foo/Bar.class", "com/foo/data.txt"]);
        let classfiles: Vec<&str> = element.classfile_resources().map(|r| r.path()).collect();
        assert_eq!(classfiles, vec!["com/foo/Bar.class"]);
        // Ancestors of the whitelisted package are timestamped too.
        assert!(element.timestamps().contains_key(""));
        assert!(element.timestamps().contains_key("com/"));
        assert!(element.timestamps().contains_key("com/foo/Bar.class"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn dir_scan_terminates_on_symlink_cycle() {
        let root = temp_dir("symlink_cycle");
        write_file(&root.join("com/foo/Bar.class"), b"xx");
        // com/foo/loop -> com, a cycle back to an ancestor.
        std::os::unix::fs::symlink(root.join("com"), root.join("com/foo/loop")).unwrap();

        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(root.clone());
        element.scan_paths(&spec, &pool).unwrap();

        assert_eq!(element.state(), ElementState::Scanned);
        // The classfile is seen exactly once even though two paths reach it.
        let count = element
            .matched_resources()
            .iter()
            .filter(|r| r.path().ends_with("Bar.class"))
            .count();
        assert_eq!(count, 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_dir_marks_element_skipped_not_fatal() {
        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(temp_dir("does_not_exist"));
        element.scan_paths(&spec, &pool).unwrap();
        assert!(element.is_skipped());
        assert!(element.matched_resources().is_empty());
    }

    #[test]
    fn scanning_twice_is_a_usage_error() {
        let root = temp_dir("double_scan");
        write_file(&root.join("a.txt"), b"x");
        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(root.clone());
        element.scan_paths(&spec, &pool).unwrap();
        assert!(element.scan_paths(&spec, &pool).is_err());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn jar_scan_filters_and_loads_entries() {
        let jar = temp_dir("jar_scan").join("lib.jar");
        write_jar(
            &jar,
            &[
                ("com/foo/Bar.class", b"classbytes".as_slice()),
                ("com/foo/notes.txt", b"notes".as_slice()),
                ("com/bar/Baz.class", b"other".as_slice()),
            ],
        );

        let spec = spec_for_package("com.foo");
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_jar(jar.clone(), String::new(), None);
        element.scan_paths(&spec, &pool).unwrap();

        let mut paths: Vec<&str> = element
            .matched_resources()
            .iter()
            .map(|r| r.path())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["com/foo/Bar.class", "com/foo/notes.txt"]);

        let bar = element
            .matched_resources()
            .iter()
            .find(|r| r.path() == "com/foo/Bar.class")
            .unwrap();
        assert_eq!(bar.load().unwrap(), b"classbytes");

        element.close();
        assert_eq!(pool.close(), 0);
        std::fs::remove_dir_all(jar.parent().unwrap()).unwrap();
    }

    #[test]
    fn jar_package_root_strips_prefix_and_hides_outside_content() {
        let jar = temp_dir("jar_root").join("app.jar");
        write_jar(
            &jar,
            &[
                ("BOOT-INF/classes/com/foo/Bar.class", b"inner".as_slice()),
                ("com/foo/Outside.class", b"outer".as_slice()),
            ],
        );

        let spec = spec_for_package("com.foo");
        let pool = Recycler::new();
        let mut element =
            ClasspathElement::new_jar(jar.clone(), "BOOT-INF/classes".to_string(), None);
        element.scan_paths(&spec, &pool).unwrap();

        let paths: Vec<&str> = element
            .matched_resources()
            .iter()
            .map(|r| r.path())
            .collect();
        assert_eq!(paths, vec!["com/foo/Bar.class"]);
        std::fs::remove_dir_all(jar.parent().unwrap()).unwrap();
    }

    #[test]
    fn timestamp_key_carries_package_root_after_one_separator() {
        let rooted = ClasspathElement::new_jar(
            PathBuf::from("app.jar"),
            "BOOT-INF/classes".to_string(),
            None,
        );
        let key = rooted.timestamp_key("com/foo/Bar.class");
        assert_eq!(key, "app.jar!/BOOT-INF/classes/com/foo/Bar.class");
        assert_eq!(key.matches("!/").count(), 1);

        let plain = ClasspathElement::new_jar(PathBuf::from("lib.jar"), String::new(), None);
        assert_eq!(
            plain.timestamp_key("com/foo/Bar.class"),
            "lib.jar!/com/foo/Bar.class"
        );
    }

    #[test]
    fn nested_prefix_stops_enumeration() {
        let jar = temp_dir("jar_nested").join("outer.jar");
        write_jar(
            &jar,
            &[
                ("com/foo/Bar.class", b"a".as_slice()),
                ("lib/inner.jar", b"not really a jar".as_slice()),
                ("lib/other.txt", b"b".as_slice()),
            ],
        );

        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_jar(jar.clone(), String::new(), None);
        element.add_nested_prefix("lib".to_string());
        element.scan_paths(&spec, &pool).unwrap();

        let mut paths: Vec<&str> = element
            .matched_resources()
            .iter()
            .map(|r| r.path())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["com/foo/Bar.class"]);
        std::fs::remove_dir_all(jar.parent().unwrap()).unwrap();
    }

    #[test]
    fn module_descriptor_is_not_a_classfile_candidate() {
        let root = temp_dir("module_scan");
        write_file(&root.join("module-info.class"), b"mm");
        write_file(&root.join("com/foo/Bar.class"), b"xx");

        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_module("com.foo".to_string(), root.clone());
        element.scan_paths(&spec, &pool).unwrap();

        assert_eq!(element.matched_resources().len(), 2);
        let classfiles: Vec<&str> = element.classfile_resources().map(|r| r.path()).collect();
        assert_eq!(classfiles, vec!["com/foo/Bar.class"]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn double_open_is_an_error_and_close_resets() {
        let root = temp_dir("double_open");
        write_file(&root.join("a.txt"), b"hello");
        let spec = ScanSpec::new();
        let pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(root.clone());
        element.scan_paths(&spec, &pool).unwrap();

        let resource = &element.matched_resources()[0];
        let reader = resource.open().unwrap();
        assert!(resource.open().is_err());
        drop(reader);
        assert_eq!(resource.load().unwrap(), b"hello");

        std::fs::remove_dir_all(&root).unwrap();
    }
}
