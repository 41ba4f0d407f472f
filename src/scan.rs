//! Scan sessions: classpath entry parsing, the two-stage parallel pipeline
//! (enumerate resource paths, then parse matched classfiles), and the query
//! surface over the results.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context, Result};
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::class_info::ClassInfo;
use crate::classfile::parse_classfile;
use crate::element::{ClasspathElement, JarSlab, Resource};
use crate::matcher::ScanSpec;
use crate::queue::WorkQueue;
use crate::reader::ClassfileReader;
use crate::recycler::Recycler;

#[cfg(windows)]
const CLASSPATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: char = ':';

/// Separates an archive path from a path inside the archive, as in
/// `app.jar!/BOOT-INF/classes` or `app.jar!/lib/inner.jar`.
const JAR_URL_SEPARATOR: &str = "!/";

/// Builder for one scan: matcher configuration, classpath entries, and
/// parallelism. `scan()` runs the pipeline and returns the results; the
/// builder can be reused for another scan.
pub struct Scanner {
    spec: ScanSpec,
    entries: Vec<String>,
    modules: Vec<(String, PathBuf)>,
    num_threads: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            spec: ScanSpec::new(),
            entries: Vec::new(),
            modules: Vec::new(),
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Matcher configuration (whitelists, blacklists, jar filter).
    pub fn spec_mut(&mut self) -> &mut ScanSpec {
        &mut self.spec
    }

    pub fn whitelist_package(&mut self, package: &str) -> &mut Self {
        self.spec.whitelist_package(package);
        self
    }

    pub fn blacklist_package(&mut self, package: &str) -> &mut Self {
        self.spec.blacklist_package(package);
        self
    }

    pub fn whitelist_class(&mut self, class_name: &str) -> &mut Self {
        self.spec.whitelist_class(class_name);
        self
    }

    /// Add one classpath entry: a directory, a jar, a package root inside a
    /// jar (`app.jar!/BOOT-INF/classes`), or a nested jar
    /// (`app.jar!/lib/inner.jar`).
    pub fn add_classpath_entry(&mut self, entry: &str) -> &mut Self {
        let entry = entry.trim();
        if !entry.is_empty() && !self.entries.iter().any(|e| e == entry) {
            self.entries.push(entry.to_string());
        }
        self
    }

    /// Add a classpath string in the platform's `java.class.path` form.
    pub fn add_classpath(&mut self, classpath: &str) -> &mut Self {
        for entry in classpath.split(CLASSPATH_SEPARATOR) {
            self.add_classpath_entry(entry);
        }
        self
    }

    /// Add a named module rooted at an exploded directory or a modular jar.
    pub fn add_module(&mut self, name: &str, location: &Path) -> &mut Self {
        self.modules.push((name.to_string(), location.to_path_buf()));
        self
    }

    pub fn num_threads(&mut self, n: usize) -> &mut Self {
        self.num_threads = n.max(1);
        self
    }

    pub fn scan(&self) -> Result<ScanResult> {
        let jar_pool: Recycler<PathBuf, JarSlab> = Recycler::new();
        let (mut elements, mut skipped_elements) = self.build_elements(&jar_pool)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .context("cannot build scan thread pool")?;
        // Workers spawned into the pool plus the calling thread.
        let extra_workers = self.num_threads.saturating_sub(1);

        // Stage 1: enumerate resource paths per element.
        {
            let slots: Vec<Mutex<&mut ClasspathElement>> =
                elements.iter_mut().map(Mutex::new).collect();
            let queue = WorkQueue::with_items(0..slots.len());
            queue.run(&pool, extra_workers, |i, _queue| {
                let mut element = slots[i].lock().expect("element slot poisoned");
                element.scan_paths(&self.spec, &jar_pool)
            })?;
        }

        // Stage 2: parse every matched classfile. Units carry a position so
        // that when two elements define the same class, the earlier
        // classpath entry wins, as the JVM's own resolution would.
        let mut units: Vec<(usize, &Resource)> = Vec::new();
        for element in &elements {
            for resource in element.classfile_resources() {
                units.push((units.len(), resource));
            }
        }
        let parsed: Mutex<Vec<(usize, ClassInfo)>> = Mutex::new(Vec::with_capacity(units.len()));
        let queue = WorkQueue::with_items(units);
        queue.run(&pool, extra_workers, |(position, resource), _queue| {
            match parse_resource(resource) {
                Ok(info) => {
                    parsed
                        .lock()
                        .expect("parse results poisoned")
                        .push((position, info));
                }
                Err(e) => {
                    warn!("skipping unparseable classfile {}: {e:#}", resource.path());
                }
            }
            Ok(())
        })?;

        let mut parsed = parsed.into_inner().expect("parse results poisoned");
        parsed.sort_by_key(|(position, _)| *position);
        let mut classes: HashMap<String, ClassInfo> = HashMap::with_capacity(parsed.len());
        for (_, info) in parsed {
            if classes.contains_key(&info.name) {
                debug!("class {} masked by an earlier classpath entry", info.name);
                continue;
            }
            classes.insert(info.name.clone(), info);
        }

        let mut resource_paths = Vec::new();
        let mut classfile_paths = Vec::new();
        let mut timestamps = HashMap::new();
        for element in &mut elements {
            if element.is_skipped() {
                skipped_elements.push(element.description());
            }
            for resource in element.matched_resources() {
                resource_paths.push(resource.path().to_string());
            }
            for resource in element.classfile_resources() {
                classfile_paths.push(resource.path().to_string());
            }
            for (path, mtime) in element.timestamps() {
                timestamps.insert(element.timestamp_key(path), *mtime);
            }
            element.close();
        }

        let leftover = jar_pool.close();
        if leftover > 0 {
            debug!("{leftover} jar handles still outstanding at session close");
        }

        Ok(ScanResult {
            classes,
            resource_paths,
            classfile_paths,
            timestamps,
            skipped_elements,
        })
    }

    /// Turn entry strings and module registrations into elements. Nested
    /// entries (`outer.jar!/...`) claim their prefix inside the outer jar's
    /// element so shared content is enumerated once. Entries that fail
    /// before an element exists are returned as skipped-element records.
    fn build_elements(
        &self,
        jar_pool: &Recycler<PathBuf, JarSlab>,
    ) -> Result<(Vec<ClasspathElement>, Vec<String>)> {
        let mut elements: Vec<ClasspathElement> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        // Index of the plain (no package root) element per outer jar path.
        let mut base_jar_index: HashMap<PathBuf, usize> = HashMap::new();
        let mut nested: Vec<(PathBuf, String)> = Vec::new();
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();

        for entry in &self.entries {
            if let Some((outer, inner)) = entry.split_once(JAR_URL_SEPARATOR) {
                let outer_path = PathBuf::from(outer);
                if !self.jar_accepted(&outer_path) {
                    continue;
                }
                let inner = inner.trim_matches('/');
                nested.push((outer_path.clone(), inner.to_string()));
                if inner.ends_with(".jar") {
                    match extract_nested_jar(&outer_path, inner, jar_pool) {
                        Ok(element) => elements.push(element),
                        Err(e) => {
                            warn!("skipping nested jar {entry}: {e:#}");
                            skipped.push(entry.clone());
                        }
                    }
                } else {
                    elements.push(ClasspathElement::new_jar(
                        outer_path,
                        inner.to_string(),
                        None,
                    ));
                }
                continue;
            }

            let path = PathBuf::from(entry);
            if path.is_dir() {
                let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                if seen_dirs.insert(canonical) {
                    elements.push(ClasspathElement::new_dir(path));
                }
            } else if path.is_file() {
                if !self.jar_accepted(&path) {
                    continue;
                }
                let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                if !base_jar_index.contains_key(&canonical) {
                    base_jar_index.insert(canonical, elements.len());
                    elements.push(ClasspathElement::new_jar(path, String::new(), None));
                }
            } else {
                debug!("classpath entry does not exist, skipping: {entry}");
            }
        }

        for (name, location) in &self.modules {
            elements.push(ClasspathElement::new_module(name.clone(), location.clone()));
        }

        // Content claimed by a package-root or nested-jar entry must not
        // also surface through the plain element for the same jar.
        for (outer_path, inner) in nested {
            let canonical = outer_path.canonicalize().unwrap_or(outer_path);
            if let Some(&i) = base_jar_index.get(&canonical) {
                elements[i].add_nested_prefix(inner);
            }
        }

        Ok((elements, skipped))
    }

    fn jar_accepted(&self, path: &Path) -> bool {
        let leafname = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let accepted = self
            .spec
            .jar_filter
            .is_whitelisted_and_not_blacklisted(leafname);
        if !accepted {
            debug!("jar filtered out: {}", path.display());
        }
        accepted
    }
}

fn parse_resource(resource: &Resource) -> Result<ClassInfo> {
    // Directory classfiles stream straight from disk; jar entries are
    // already decompressed in memory, so parse those in place.
    if resource.is_file_backed() {
        let mut reader = ClassfileReader::from_stream(resource.open()?);
        Ok(parse_classfile(&mut reader)?)
    } else {
        let bytes = resource.load()?;
        let mut reader = ClassfileReader::from_bytes(&bytes);
        Ok(parse_classfile(&mut reader)?)
    }
}

fn extract_nested_jar(
    outer_path: &Path,
    inner: &str,
    jar_pool: &Recycler<PathBuf, JarSlab>,
) -> Result<ClasspathElement> {
    let key = outer_path
        .canonicalize()
        .unwrap_or_else(|_| outer_path.to_path_buf());
    let slab = jar_pool.acquire(&key, || JarSlab::open(outer_path))?;
    let bytes = slab.read_entry(inner);
    jar_pool.release(slab);
    let bytes = bytes?;

    let mut temp = NamedTempFile::new().context("cannot create temp file for nested jar")?;
    temp.write_all(&bytes)?;
    let temp_path = temp.into_temp_path();
    let jar_path = temp_path.to_path_buf();
    debug!(
        "extracted nested jar {}!/{inner} to {}",
        outer_path.display(),
        jar_path.display()
    );
    Ok(ClasspathElement::new_jar(
        jar_path,
        String::new(),
        Some(temp_path),
    ))
}

/// Results of one scan: parsed classes keyed by name, matched resource
/// paths, and per-path timestamps for change detection.
pub struct ScanResult {
    classes: HashMap<String, ClassInfo>,
    resource_paths: Vec<String>,
    classfile_paths: Vec<String>,
    timestamps: HashMap<String, SystemTime>,
    skipped_elements: Vec<String>,
}

impl ScanResult {
    pub fn class_info(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn all_classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    pub fn resource_paths(&self) -> &[String] {
        &self.resource_paths
    }

    /// Matched resources that were classfile candidates.
    pub fn classfile_paths(&self) -> &[String] {
        &self.classfile_paths
    }

    pub fn timestamps(&self) -> &HashMap<String, SystemTime> {
        &self.timestamps
    }

    pub fn newest_timestamp(&self) -> Option<SystemTime> {
        self.timestamps.values().max().copied()
    }

    /// Elements excluded from the results because of I/O failures.
    pub fn skipped_elements(&self) -> &[String] {
        &self.skipped_elements
    }

    /// Classes whose superclass chain reaches `name`. Superclasses outside
    /// the scanned set simply end the chain.
    pub fn subclasses_of(&self, name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> = self
            .classes
            .values()
            .filter(|info| info.name != name && self.extends(info, name))
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    fn extends(&self, info: &ClassInfo, target: &str) -> bool {
        let mut current = info.superclass_name.as_deref();
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(super_name) = current {
            if super_name == target {
                return true;
            }
            // Malformed input could cycle; stop at the first repeat.
            if !seen.insert(super_name) {
                return false;
            }
            current = self
                .classes
                .get(super_name)
                .and_then(|s| s.superclass_name.as_deref());
        }
        false
    }

    /// Classes (and interfaces) implementing or extending the named
    /// interface, directly or through scanned ancestors.
    pub fn classes_implementing(&self, interface_name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> = self
            .classes
            .values()
            .filter(|info| {
                info.name != interface_name && {
                    let mut seen = HashSet::new();
                    self.implements(info, interface_name, &mut seen)
                }
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    fn implements<'a>(
        &'a self,
        info: &'a ClassInfo,
        target: &str,
        seen: &mut HashSet<&'a str>,
    ) -> bool {
        if !seen.insert(&info.name) {
            return false;
        }
        for interface in &info.interface_names {
            if interface == target {
                return true;
            }
            if let Some(parent) = self.classes.get(interface)
                && self.implements(parent, target, seen)
            {
                return true;
            }
        }
        if let Some(super_name) = info.superclass_name.as_deref()
            && let Some(parent) = self.classes.get(super_name)
        {
            return self.implements(parent, target, seen);
        }
        false
    }

    /// Classes carrying the named annotation directly.
    pub fn classes_with_annotation(&self, annotation_name: &str) -> Vec<&ClassInfo> {
        let mut result: Vec<&ClassInfo> = self
            .classes
            .values()
            .filter(|info| info.has_annotation(annotation_name))
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_info::ClassInfo;

    fn class(name: &str, superclass: Option<&str>, interfaces: &[&str]) -> ClassInfo {
        ClassInfo::new(
            name.to_string(),
            0,
            superclass.map(str::to_string),
            interfaces.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
        )
    }

    fn result_with(classes: Vec<ClassInfo>) -> ScanResult {
        ScanResult {
            classes: classes.into_iter().map(|c| (c.name.clone(), c)).collect(),
            resource_paths: Vec::new(),
            classfile_paths: Vec::new(),
            timestamps: HashMap::new(),
            skipped_elements: Vec::new(),
        }
    }

    #[test]
    fn subclasses_walk_the_scanned_superclass_chain() {
        let result = result_with(vec![
            class("com.foo.Base", Some("java.lang.Object"), &[]),
            class("com.foo.Mid", Some("com.foo.Base"), &[]),
            class("com.foo.Leaf", Some("com.foo.Mid"), &[]),
            class("com.foo.Other", Some("java.lang.Object"), &[]),
        ]);
        let names: Vec<&str> = result
            .subclasses_of("com.foo.Base")
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["com.foo.Leaf", "com.foo.Mid"]);
    }

    #[test]
    fn subclass_walk_tolerates_unresolved_and_cyclic_supers() {
        let result = result_with(vec![
            class("com.foo.A", Some("com.foo.B"), &[]),
            class("com.foo.B", Some("com.foo.A"), &[]),
            class("com.foo.C", Some("unscanned.Missing"), &[]),
        ]);
        assert!(result.subclasses_of("com.foo.X").is_empty());
        let names: Vec<&str> = result
            .subclasses_of("com.foo.B")
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["com.foo.A"]);
    }

    #[test]
    fn implementing_classes_found_through_superclass_and_superinterface() {
        let result = result_with(vec![
            class("com.foo.Iface", None, &[]),
            class("com.foo.SubIface", None, &["com.foo.Iface"]),
            class(
                "com.foo.Direct",
                Some("java.lang.Object"),
                &["com.foo.Iface"],
            ),
            class(
                "com.foo.ViaSubIface",
                Some("java.lang.Object"),
                &["com.foo.SubIface"],
            ),
            class("com.foo.ViaSuper", Some("com.foo.Direct"), &[]),
            class("com.foo.Unrelated", Some("java.lang.Object"), &[]),
        ]);
        let names: Vec<&str> = result
            .classes_implementing("com.foo.Iface")
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "com.foo.Direct",
                "com.foo.SubIface",
                "com.foo.ViaSubIface",
                "com.foo.ViaSuper"
            ]
        );
    }

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_scanner_scan_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn minimal_class_bytes(this: &str, superclass: &str) -> Vec<u8> {
        fn utf8(out: &mut Vec<u8>, s: &str) {
            out.push(1);
            out.extend_from_slice(&(s.len() as u16).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        let mut cp = Vec::new();
        utf8(&mut cp, this); // #1
        cp.push(7);
        cp.extend_from_slice(&1u16.to_be_bytes()); // #2: Class -> #1
        utf8(&mut cp, superclass); // #3
        cp.push(7);
        cp.extend_from_slice(&3u16.to_be_bytes()); // #4: Class -> #3

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABE_u32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major
        out.extend_from_slice(&5u16.to_be_bytes()); // cp count
        out.extend_from_slice(&cp);
        out.extend_from_slice(&0x0021u16.to_be_bytes()); // access
        out.extend_from_slice(&2u16.to_be_bytes()); // this_class
        out.extend_from_slice(&4u16.to_be_bytes()); // super_class
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&0u16.to_be_bytes()); // methods
        out.extend_from_slice(&0u16.to_be_bytes()); // attributes
        out
    }

    #[test]
    fn directory_classfiles_parse_in_stream_mode() {
        let root = temp_dir("stream_parse");
        let class_path = root.join("com/foo/Bar.class");
        std::fs::create_dir_all(class_path.parent().unwrap()).unwrap();
        std::fs::write(
            &class_path,
            minimal_class_bytes("com/foo/Bar", "java/lang/Object"),
        )
        .unwrap();

        let spec = ScanSpec::new();
        let jar_pool = Recycler::new();
        let mut element = ClasspathElement::new_dir(root.clone());
        element.scan_paths(&spec, &jar_pool).unwrap();

        let resource = element.classfile_resources().next().unwrap();
        assert!(resource.is_file_backed());
        let info = parse_resource(resource).unwrap();
        assert_eq!(info.name, "com.foo.Bar");
        assert_eq!(info.superclass_name.as_deref(), Some("java.lang.Object"));
        // The stream handle closed on drop, so the resource opens again.
        assert!(!parse_resource(resource).unwrap().name.is_empty());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn classpath_string_splits_and_dedupes() {
        let mut scanner = Scanner::new();
        let joined = format!("a{CLASSPATH_SEPARATOR}b{CLASSPATH_SEPARATOR}a{CLASSPATH_SEPARATOR}");
        scanner.add_classpath(&joined);
        assert_eq!(scanner.entries, vec!["a", "b"]);
    }
}
