use std::fmt;
use std::hash::Hasher as _;

use derive_more::Display;
use metrohash::MetroHash128;

/// Name prefix of union-filesystem deletion markers.
pub const WHITEOUT_PREFIX: &str = ".wh.";
/// Marker hiding everything the lower layers put in its directory.
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

const FINGERPRINT_LEN: usize = 16;

/// The kind of filesystem object an [`Entry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntryKind {
    #[display("file")]
    Regular,
    #[display("dir")]
    Directory,
    #[display("symlink")]
    Symlink,
    #[display("whiteout")]
    Whiteout,
}

impl EntryKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "regular" => Some(EntryKind::Regular),
            "dir" | "directory" => Some(EntryKind::Directory),
            "symlink" | "link" => Some(EntryKind::Symlink),
            "whiteout" => Some(EntryKind::Whiteout),
            _ => None,
        }
    }

    /// Single character used in the attribute column of rendered trees.
    pub fn flag(&self) -> char {
        match self {
            EntryKind::Regular => '-',
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::Whiteout => 'w',
        }
    }
}

/// Fixed-width content hash. Directories always carry [`Fingerprint::ZERO`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub const ZERO: Fingerprint = Fingerprint([0; FINGERPRINT_LEN]);

    /// Hashes raw content with MetroHash128.
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = MetroHash128::default();
        hasher.write(content);
        let (high, low) = hasher.finish128();

        let mut bytes = [0; FINGERPRINT_LEN];
        bytes[..8].copy_from_slice(&high.to_be_bytes());
        bytes[8..].copy_from_slice(&low.to_be_bytes());
        Fingerprint(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0; FINGERPRINT_LEN];
        hex::decode_to_slice(value.trim(), &mut bytes)?;
        Ok(Fingerprint(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Fingerprint::ZERO
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// One filesystem object as observed in a single layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    path: String,
    kind: EntryKind,
    fingerprint: Fingerprint,
    size: u64,
    link_target: Option<String>,
}

impl Entry {
    pub fn new(path: impl Into<String>, kind: EntryKind, fingerprint: Fingerprint) -> Self {
        let fingerprint = match kind {
            EntryKind::Directory | EntryKind::Whiteout => Fingerprint::ZERO,
            _ => fingerprint,
        };
        Entry {
            path: path.into(),
            kind,
            fingerprint,
            size: 0,
            link_target: None,
        }
    }

    pub fn file(path: impl Into<String>, fingerprint: Fingerprint, size: u64) -> Self {
        Entry::new(path, EntryKind::Regular, fingerprint).with_size(size)
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Entry::new(path, EntryKind::Directory, Fingerprint::ZERO)
    }

    /// A symlink is fingerprinted by its target, so retargeting counts as a change.
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        let mut entry = Entry::new(path, EntryKind::Symlink, Fingerprint::of(target.as_bytes()));
        entry.link_target = Some(target);
        entry
    }

    /// Builds the marker that deletes `target` from the layers below.
    pub fn whiteout(target: &str) -> Self {
        Entry::new(whiteout_path(target), EntryKind::Whiteout, Fingerprint::ZERO)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        if !matches!(self.kind, EntryKind::Directory | EntryKind::Whiteout) {
            self.size = size;
        }
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Content equality ignores path, size and link target.
    pub fn content_eq(&self, other: &Entry) -> bool {
        self.kind == other.kind && self.fingerprint == other.fingerprint
    }
}

/// Rewrites `/a/b` into `/a/.wh.b`. Paths already in marker form are kept.
pub fn whiteout_path(target: &str) -> String {
    let trimmed = target.trim_end_matches('/');
    let (parent, name) = match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    };
    if name.starts_with(WHITEOUT_PREFIX) {
        return trimmed.to_string();
    }
    format!("{parent}/{WHITEOUT_PREFIX}{name}")
}
