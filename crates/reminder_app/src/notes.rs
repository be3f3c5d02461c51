//! Block source backed by a directory of Markdown and Org files.
//!
//! A block is a bullet line (`-` or `*`) plus the deeper-indented lines that
//! follow it. In `.org` files a heading at column zero also takes the
//! unindented planning and property lines below it. A block's id is its
//! `id::` property, or else `relative/path.md#<digest>` of its first line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reminder_core::scanner::clean_display_text;
use reminder_core::{BlockQuery, BlockRecord, BlockSource, HostError};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const NOTE_EXTENSIONS: [&str; 3] = ["md", "markdown", "org"];
const SCHEDULED_PROPERTY: &str = "scheduled";
const ID_PROPERTY: &str = "id";
const ANCHOR_DIGEST_LEN: usize = 12;

pub struct NotesDirectory {
    root: PathBuf,
}

impl NotesDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every block in every note under the root, in path order.
    pub fn load_blocks(&self) -> Result<Vec<BlockRecord>, HostError> {
        if !self.root.is_dir() {
            return Err(HostError::Unavailable(format!(
                "notes root {} is not a directory",
                self.root.display()
            )));
        }
        let mut blocks = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "skipping unreadable notes entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_note_file(entry.path()) {
                continue;
            }
            let text = match std::fs::read_to_string(entry.path()) {
                Ok(text) => text,
                Err(err) => {
                    warn!(path = %entry.path().display(), %err, "skipping unreadable note");
                    continue;
                }
            };
            let relative = relative_id(&self.root, entry.path());
            let container = entry
                .path()
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| relative.clone());
            blocks.extend(parse_blocks(&relative, &container, &text));
        }
        debug!(count = blocks.len(), root = %self.root.display(), "loaded note blocks");
        Ok(blocks)
    }
}

#[async_trait]
impl BlockSource for NotesDirectory {
    async fn query(&self, query: &BlockQuery) -> Result<Vec<BlockRecord>, HostError> {
        let notes = NotesDirectory::new(self.root.clone());
        let blocks = tokio::task::spawn_blocking(move || notes.load_blocks())
            .await
            .map_err(|err| HostError::Unavailable(format!("notes walker stopped: {err}")))??;
        Ok(blocks
            .into_iter()
            .filter(|block| matches_query(block, query))
            .collect())
    }
}

pub fn matches_query(block: &BlockRecord, query: &BlockQuery) -> bool {
    match query {
        BlockQuery::ContainsMarker(marker) => block.raw_text.contains(marker.as_str()),
        BlockQuery::HasScheduledProperty => block.scheduled_property.is_some(),
    }
}

/// Splits one note into blocks. Heading mode applies only to `.org` files.
pub fn parse_blocks(relative_path: &str, container: &str, text: &str) -> Vec<BlockRecord> {
    let org = is_org_file(Path::new(relative_path));
    let mut pending = Vec::new();
    let mut current: Option<PendingBlock> = None;

    for line in text.lines() {
        if let Some(bullet) = Bullet::parse(line, org) {
            pending.extend(current.take());
            current = Some(PendingBlock::new(bullet, line));
            continue;
        }
        let Some(block) = current.as_mut() else {
            continue;
        };
        if !line.trim().is_empty() && block.absorbs(line) {
            block.push(line);
        } else {
            pending.extend(current.take());
        }
    }
    pending.extend(current);

    let mut ids = BlockIds::new(relative_path);
    pending
        .into_iter()
        .map(|block| block.finish(&mut ids, container))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Bullet {
    indent: usize,
    heading: bool,
}

impl Bullet {
    fn parse(line: &str, org: bool) -> Option<Self> {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if org && indent == 0 && trimmed.starts_with('*') {
            let rest = trimmed.trim_start_matches('*');
            if rest.is_empty() || rest.starts_with(' ') {
                return Some(Self {
                    indent,
                    heading: true,
                });
            }
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some('-' | '*'), None | Some(' ' | '\t')) => Some(Self {
                indent,
                heading: false,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingBlock {
    bullet: Bullet,
    lines: Vec<String>,
}

impl PendingBlock {
    fn new(bullet: Bullet, first: &str) -> Self {
        Self {
            bullet,
            lines: vec![first.trim_end().to_string()],
        }
    }

    fn absorbs(&self, line: &str) -> bool {
        let indent = line.len() - line.trim_start().len();
        self.bullet.heading || indent > self.bullet.indent
    }

    fn push(&mut self, line: &str) {
        self.lines.push(line.trim_end().to_string());
    }

    fn property(&self, key: &str) -> Option<String> {
        self.lines
            .iter()
            .skip(1)
            .find_map(|line| property_value(line, key))
    }

    fn finish(self, ids: &mut BlockIds<'_>, container: &str) -> BlockRecord {
        let id = match self.property(ID_PROPERTY) {
            Some(id) => id,
            None => ids.anchored(&self.lines[0]),
        };
        BlockRecord {
            id,
            scheduled_property: self.property(SCHEDULED_PROPERTY),
            raw_text: self.lines.join("\n"),
            container_name: container.to_string(),
        }
    }
}

/// Hands out ids that survive edits elsewhere in the file: the path plus a
/// digest of the block's first line without scheduling syntax. Repeated
/// first lines in one file get an ordinal suffix.
struct BlockIds<'a> {
    relative_path: &'a str,
    seen: HashMap<String, usize>,
}

impl<'a> BlockIds<'a> {
    fn new(relative_path: &'a str) -> Self {
        Self {
            relative_path,
            seen: HashMap::new(),
        }
    }

    fn anchored(&mut self, first_line: &str) -> String {
        let digest = anchor_digest(first_line);
        let count = self.seen.entry(digest.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            format!("{}#{digest}", self.relative_path)
        } else {
            format!("{}#{digest}-{count}", self.relative_path)
        }
    }
}

/// First 12 hex digits of the SHA-256 of a block's cleaned first line.
pub fn anchor_digest(first_line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clean_display_text(first_line).as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(ANCHOR_DIGEST_LEN);
    digest
}

/// Value of a `key:: value` line when its key matches (case-insensitive).
fn property_value(line: &str, key: &str) -> Option<String> {
    let (name, value) = line.trim().split_once("::")?;
    if !name.trim().eq_ignore_ascii_case(key) {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

pub fn is_note_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            NOTE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn is_org_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("org"))
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
