//! Re-resolution on file changes.
//!
//! Watches the directories holding every source of a resolution, every
//! directory an include was looked up in, and the common include
//! directories. Uses debouncing to coalesce rapid file changes such as an
//! editor writing a temporary file and renaming it over the original.
//!
//! Events only nominate a change. A batch triggers a new resolution only if
//! the modification time or length of some tracked file differs from the
//! last snapshot, or a tracked directory appeared or vanished. Reading the
//! files during resolution produces access events that must not count.

use super::loader::{ConfigResolver, ResolveError, ResolvedConfig};
use super::overrides::Override;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Modification time and length of a file; `None` marks a directory.
type Fingerprint = Option<(Option<SystemTime>, u64)>;

/// State of every tracked path that exists.
pub type Snapshot = BTreeMap<PathBuf, Fingerprint>;

/// Files and directories a resolution depends on.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    files: Vec<PathBuf>,
    search_dirs: Vec<PathBuf>,
    extension: String,
    baseline: Snapshot,
}

impl WatchSet {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            ..Self::default()
        }
    }

    /// Add files; paths are canonicalized where possible.
    pub fn extend<'p>(&mut self, files: impl IntoIterator<Item = &'p Path>) {
        for file in files {
            let file = absolute(file);
            if !self.files.contains(&file) {
                self.files.push(file);
            }
        }
    }

    /// Add directories that may hold include files, existing or not.
    pub fn add_dirs<'p>(&mut self, dirs: impl IntoIterator<Item = &'p Path>) {
        for dir in dirs {
            let dir = absolute(dir);
            if !self.search_dirs.contains(&dir) {
                self.search_dirs.push(dir);
            }
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Directories to watch: the parent of every file, then every search
    /// directory.
    pub fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        let parents = self.files.iter().filter_map(|f| f.parent());
        for dir in parents.chain(self.search_dirs.iter().map(PathBuf::as_path)) {
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
        dirs
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    /// Whether an event on `path` can signal a change to the resolution.
    ///
    /// A known source always matters. Any other file with the include
    /// extension might now shadow a candidate that was found later. A
    /// search directory that was missing matters once it is created.
    pub fn is_relevant(&self, path: &Path) -> bool {
        let path = absolute(path);
        self.files.contains(&path)
            || self.has_extension(&path)
            || (self.search_dirs.contains(&path) && !self.baseline.contains_key(&path))
    }

    /// Current state of the tracked files, of every existing watched
    /// directory and of the include files inside them.
    ///
    /// Only reads metadata and directory listings, never file contents.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for file in &self.files {
            if let Ok(meta) = std::fs::metadata(file) {
                snapshot.insert(file.clone(), Some((meta.modified().ok(), meta.len())));
            }
        }
        for dir in self.dirs() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for path in entries.flatten().map(|e| e.path()) {
                if self.has_extension(&path)
                    && let Ok(meta) = std::fs::metadata(&path)
                    && meta.is_file()
                {
                    snapshot.insert(path, Some((meta.modified().ok(), meta.len())));
                }
            }
            snapshot.insert(dir, None);
        }
        snapshot
    }

    /// Record the state later changes are compared against.
    pub fn set_baseline(&mut self, snapshot: Snapshot) {
        self.baseline = snapshot;
    }

    /// Take a new snapshot; if it differs from the baseline, it becomes
    /// the baseline and `true` is returned.
    pub fn has_changed(&mut self) -> bool {
        let current = self.snapshot();
        if current == self.baseline {
            return false;
        }
        self.baseline = current;
        true
    }
}

/// Canonical form of `path`; a missing path gets its parent canonicalized so
/// it compares equal to event paths once it is created.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(path) = std::fs::canonicalize(path) {
        return path;
    }
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (path.parent().map(std::fs::canonicalize), path.file_name()) {
        (Some(Ok(parent)), Some(name)) => parent.join(name),
        _ => path,
    }
}

/// Changed paths among debounced events that matter for `set`.
fn relevant_changes(events: Vec<DebouncedEvent>, set: &WatchSet) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = Vec::new();
    for event in events {
        if !matches!(
            event.kind,
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
        ) {
            continue;
        }
        if set.is_relevant(&event.path) && !changed.contains(&event.path) {
            changed.push(event.path);
        }
    }
    changed
}

/// Resolve `root`, then resolve again after every change to a file or
/// directory the resolution depends on.
///
/// `on_result` receives each outcome, failures included; returning
/// `ControlFlow::Break` stops watching. Blocks the calling thread.
pub fn watch<F>(
    resolver: &ConfigResolver<'_>,
    root: &Path,
    overrides: &[Override],
    config: WatcherConfig,
    mut on_result: F,
) -> Result<(), notify::Error>
where
    F: FnMut(&Result<ResolvedConfig, ResolveError>) -> ControlFlow<()>,
{
    let (notify_tx, notify_rx) = mpsc::channel();
    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;

    let mut set = WatchSet::new(resolver.extension());
    set.extend([root]);
    set.add_dirs(resolver.common_dirs().iter().map(PathBuf::as_path));
    let mut watched: Vec<PathBuf> = Vec::new();

    loop {
        // Taken before reading, so an edit racing the resolution still
        // differs from the baseline.
        let before = set.snapshot();
        let result = resolver.resolve_file(root, overrides);
        match &result {
            Ok(resolved) => {
                set.extend(resolved.sources().iter().map(PathBuf::as_path));
                set.add_dirs(resolved.search_dirs().iter().map(PathBuf::as_path));
            }
            Err(e) => set.add_dirs(e.search_dirs().iter().map(PathBuf::as_path)),
        }

        for dir in set.dirs() {
            if watched.contains(&dir) {
                continue;
            }
            if dir.is_dir() {
                info!("Watching config directory: {}", dir.display());
                debouncer
                    .watcher()
                    .watch(&dir, notify::RecursiveMode::NonRecursive)?;
                watched.push(dir);
            } else {
                debug!(
                    "Config directory does not exist yet, skipping watch: {}",
                    dir.display()
                );
            }
        }

        // Newly tracked paths enter the baseline as they are now.
        let mut baseline = set.snapshot();
        baseline.extend(before);
        set.set_baseline(baseline);

        if on_result(&result).is_break() {
            return Ok(());
        }

        loop {
            match notify_rx.recv() {
                Ok(Ok(events)) => {
                    let changed = relevant_changes(events, &set);
                    if changed.is_empty() {
                        continue;
                    }
                    if set.has_changed() {
                        debug!("Config change detected: {:?}", changed);
                        break;
                    }
                    debug!("Ignoring events without content changes: {:?}", changed);
                }
                Ok(Err(e)) => error!("File watcher error: {}", e),
                Err(_) => {
                    info!("Config watcher channel closed, stopping");
                    return Ok(());
                }
            }
        }
    }
}
