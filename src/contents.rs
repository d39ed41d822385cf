use crate::error::{ScopeError, ScopeResult};
use crate::overlay::Overlay;
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Regular,
    Editable,
    Volatile,
    Directory,
    ExclusiveDirectory,
    Symlink,
    Hardlink,
    BlockDevice,
    CharDevice,
    Pipe,
}

impl FileKind {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "f" => Some(FileKind::Regular),
            "e" => Some(FileKind::Editable),
            "v" => Some(FileKind::Volatile),
            "d" => Some(FileKind::Directory),
            "x" => Some(FileKind::ExclusiveDirectory),
            "s" => Some(FileKind::Symlink),
            "l" => Some(FileKind::Hardlink),
            "b" => Some(FileKind::BlockDevice),
            "c" => Some(FileKind::CharDevice),
            "p" => Some(FileKind::Pipe),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            FileKind::Regular => 'f',
            FileKind::Editable => 'e',
            FileKind::Volatile => 'v',
            FileKind::Directory => 'd',
            FileKind::ExclusiveDirectory => 'x',
            FileKind::Symlink => 's',
            FileKind::Hardlink => 'l',
            FileKind::BlockDevice => 'b',
            FileKind::CharDevice => 'c',
            FileKind::Pipe => 'p',
        }
    }
}

// Which trailing fields a record carries depends on its kind: size/cksum/mtime
// for f/e/v, a link target for s/l, a device node pair for b/c.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileAttrs {
    Contents { size: u64, checksum: u64, modtime: i64 },
    Link { target: String },
    Device { major: u32, minor: u32 },
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDetail {
    pub path: String,
    pub kind: FileKind,
    pub class: String,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub attrs: FileAttrs,
    pub packages: Vec<String>,
}

fn parse_mode(token: &str) -> Option<u32> {
    u32::from_str_radix(token, 8).ok()
}

fn parse_name(token: &str) -> Option<String> {
    if token == "?" {
        None
    } else {
        Some(token.to_string())
    }
}

impl FileDetail {
    // One contents(4) line. Returns None for headers, comments, and records
    // too malformed to carry a full field set.
    pub fn parse(line: &str) -> Option<FileDetail> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;
        if !name.starts_with('/') {
            return None;
        }
        let kind = FileKind::from_code(tokens.next()?)?;
        let class = tokens.next()?.to_string();

        let mut path = name.to_string();
        let mut mode = None;
        let mut owner = None;
        let mut group = None;
        let attrs = match kind {
            FileKind::Symlink | FileKind::Hardlink => {
                let (link_path, target) = name.split_once('=')?;
                path = link_path.to_string();
                FileAttrs::Link {
                    target: target.to_string(),
                }
            }
            FileKind::Regular | FileKind::Editable | FileKind::Volatile => {
                mode = parse_mode(tokens.next()?);
                owner = parse_name(tokens.next()?);
                group = parse_name(tokens.next()?);
                let size = tokens.next()?.parse().ok()?;
                let checksum = tokens.next()?.parse().unwrap_or(0);
                let modtime = tokens.next()?.parse().ok()?;
                FileAttrs::Contents {
                    size,
                    checksum,
                    modtime,
                }
            }
            FileKind::BlockDevice | FileKind::CharDevice => {
                let major = tokens.next()?.parse().ok()?;
                let minor = tokens.next()?.parse().ok()?;
                mode = parse_mode(tokens.next()?);
                owner = parse_name(tokens.next()?);
                group = parse_name(tokens.next()?);
                FileAttrs::Device { major, minor }
            }
            FileKind::Directory | FileKind::ExclusiveDirectory | FileKind::Pipe => {
                mode = parse_mode(tokens.next()?);
                owner = parse_name(tokens.next()?);
                group = parse_name(tokens.next()?);
                FileAttrs::None
            }
        };

        let packages: Vec<String> = tokens.map(str::to_string).collect();
        if packages.is_empty() {
            return None;
        }

        Some(FileDetail {
            path,
            kind,
            class,
            mode,
            owner,
            group,
            attrs,
            packages,
        })
    }

    pub fn size(&self) -> Option<u64> {
        match self.attrs {
            FileAttrs::Contents { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn modtime(&self) -> Option<i64> {
        match self.attrs {
            FileAttrs::Contents { modtime, .. } => Some(modtime),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.attrs {
            FileAttrs::Link { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.packages.len() > 1
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub name: String,
    pub description: Option<String>,
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub hardlinks: usize,
    pub devices: usize,
    pub shared: usize,
    pub entries: usize,
    pub bytes: u64,
}

impl UsageSummary {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn tally(&mut self, detail: &FileDetail) {
        self.entries += 1;
        match detail.kind {
            FileKind::Regular | FileKind::Editable | FileKind::Volatile => self.files += 1,
            FileKind::Directory | FileKind::ExclusiveDirectory => self.directories += 1,
            FileKind::Symlink => self.symlinks += 1,
            FileKind::Hardlink => self.hardlinks += 1,
            FileKind::BlockDevice | FileKind::CharDevice => self.devices += 1,
            FileKind::Pipe => {}
        }
        if detail.is_shared() {
            self.shared += 1;
        }
        if let Some(size) = detail.size() {
            self.bytes += size;
        }
    }
}

#[derive(Debug, Default)]
pub struct ContentsIndex {
    by_path: HashMap<String, Arc<FileDetail>>,
    by_package: HashMap<String, Vec<Arc<FileDetail>>>,
}

impl ContentsIndex {
    // Both maps are folded in the same pass over the manifest. The manifest
    // can run to hundreds of thousands of lines, and a second derivation pass
    // over the path map measured slower than fusing the two.
    pub fn parse(content: &str) -> Self {
        let mut index = ContentsIndex::default();
        for line in content.lines() {
            let Some(detail) = FileDetail::parse(line) else {
                continue;
            };
            let detail = Arc::new(detail);
            for package in &detail.packages {
                index
                    .by_package
                    .entry(package.clone())
                    .or_default()
                    .push(detail.clone());
            }
            index.by_path.insert(detail.path.clone(), detail);
        }
        index
    }

    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let index = Self::parse(&content);
                info!(
                    "Contents index: {} paths, {} owning packages",
                    index.by_path.len(),
                    index.by_package.len()
                );
                index
            }
            Err(e) => {
                warn!("No readable contents manifest at {:?}: {}", path, e);
                ContentsIndex::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn file_detail(&self, path: &str) -> Option<&Arc<FileDetail>> {
        self.by_path.get(path)
    }

    pub fn package_files(&self, package: &str) -> Option<&[Arc<FileDetail>]> {
        self.by_package.get(package).map(|files| files.as_slice())
    }

    // Scans the package's file set on every call; package file sets are small
    // next to the whole manifest, so this is not cached.
    pub fn package_usage(&self, package: &str) -> Option<UsageSummary> {
        let files = self.by_package.get(package)?;
        let mut summary = UsageSummary::named(package);
        for detail in files {
            summary.tally(detail);
        }
        Some(summary)
    }

    // Union over the overlay's direct member packages, deduplicated by path
    // so a file shared between two members counts once.
    pub fn overlay_usage(&self, overlay: &Overlay) -> UsageSummary {
        let mut summary = UsageSummary::named(overlay.name());
        summary.description = overlay.description().map(str::to_string);
        let mut seen: HashSet<&str> = HashSet::new();
        for member in overlay.members() {
            let Some(files) = self.by_package.get(member) else {
                continue;
            };
            for detail in files {
                if seen.insert(detail.path.as_str()) {
                    summary.tally(detail);
                }
            }
        }
        summary
    }
}

// Readiness cell for the deferred manifest build: the index is filled in by a
// blocking task while catalog loading proceeds, and consumers that arrive
// early see "not yet available" instead of blocking.
#[derive(Debug)]
pub struct ContentsHandle {
    cell: Arc<OnceCell<ContentsIndex>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ContentsHandle {
    pub fn spawn(path: PathBuf) -> Self {
        let cell = Arc::new(OnceCell::new());
        let worker = cell.clone();
        let task = tokio::task::spawn_blocking(move || {
            let index = ContentsIndex::load(&path);
            let _ = worker.set(index);
        });
        Self {
            cell,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn immediate(index: ContentsIndex) -> Self {
        let cell = Arc::new(OnceCell::new());
        let _ = cell.set(index);
        Self {
            cell,
            task: Mutex::new(None),
        }
    }

    pub fn ready(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Option<&ContentsIndex> {
        self.cell.get()
    }

    pub async fn wait(&self) -> ScopeResult<&ContentsIndex> {
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            task.await?;
        }
        self.cell
            .get()
            .ok_or_else(|| ScopeError::ConfigError("contents index unavailable".to_string()))
    }
}
