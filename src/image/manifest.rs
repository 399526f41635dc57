use std::path::Path;
use std::string::FromUtf8Error;

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Yaml};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::ext::AsyncTryFrom;
use crate::filesystem::{Entry, EntryKind, Fingerprint, LayerTree, TreeError, is_whiteout};

/// One image layer with the tree of entries it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub index: usize,
    pub digest: String,
    pub command: String,
    pub tree: LayerTree,
}

impl Layer {
    /// Bytes the layer's entries hold.
    pub fn size(&self) -> u64 {
        self.tree.total_size()
    }

    /// Digest without its algorithm prefix, cut to twelve characters.
    pub fn short_digest(&self) -> &str {
        let digest = self
            .digest
            .split_once(':')
            .map_or(self.digest.as_str(), |(_, hash)| hash);
        digest.get(..12).unwrap_or(digest)
    }
}

/// Ordered layers of an image, as read from a YAML manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageManifest {
    pub layers: Vec<Layer>,
}

impl ImageManifest {
    pub fn trees(&self) -> Vec<LayerTree> {
        self.layers.iter().map(|layer| layer.tree.clone()).collect()
    }

    fn parse_layer(index: usize, layer: &Yaml) -> Result<Layer, ManifestError> {
        let layer = layer
            .as_mapping()
            .context(LayerNotMapSnafu { layer: index })?;

        let digest = text(layer, "digest").unwrap_or_else(|| format!("layer-{index}"));
        let command = text(layer, "command").unwrap_or_default();

        let mut tree = LayerTree::new();
        if let Some(entries) = field(layer, "entries").filter(|value| !value.is_null()) {
            let entries = entries
                .as_sequence()
                .context(EntriesNotSequenceSnafu { layer: index })?;
            for (position, entry) in entries.iter().enumerate() {
                let entry = Self::parse_entry(index, position, entry)?;
                let path = entry.path().to_string();
                tree.insert_path(&path, entry)
                    .context(InvalidTreePathSnafu { layer: index })?;
            }
        }

        debug!(
            "Parsed layer {index} ({digest}) with {} nodes, {} bytes",
            tree.len(),
            tree.total_size()
        );
        Ok(Layer {
            index,
            digest,
            command,
            tree,
        })
    }

    fn parse_entry(layer: usize, position: usize, entry: &Yaml) -> Result<Entry, ManifestError> {
        let entry = entry
            .as_mapping()
            .context(EntryNotMapSnafu { layer, position })?;
        let path = text(entry, "path").context(MissingPathSnafu { layer, position })?;

        let kind = match text(entry, "kind") {
            Some(kind) => EntryKind::parse(&kind).context(UnknownKindSnafu {
                layer,
                path: path.as_str(),
                kind,
            })?,
            None if is_whiteout(last_segment(&path)) => EntryKind::Whiteout,
            None => EntryKind::Regular,
        };

        let parsed = match kind {
            EntryKind::Whiteout => Entry::whiteout(&path),
            EntryKind::Directory => Entry::directory(path),
            EntryKind::Symlink => {
                let target = text(entry, "target").context(MissingLinkTargetSnafu {
                    layer,
                    path: path.as_str(),
                })?;
                Entry::symlink(path, target)
            }
            EntryKind::Regular => {
                let content = text(entry, "content");
                let fingerprint = match (text(entry, "fingerprint"), &content) {
                    (Some(hex), _) => Fingerprint::from_hex(&hex).context(InvalidFingerprintSnafu {
                        layer,
                        path: path.as_str(),
                    })?,
                    (None, Some(content)) => Fingerprint::of(content.as_bytes()),
                    (None, None) => Fingerprint::ZERO,
                };
                let size = match field(entry, "size") {
                    Some(size) => size
                        .as_integer()
                        .and_then(|size| u64::try_from(size).ok())
                        .context(InvalidSizeSnafu {
                            layer,
                            path: path.as_str(),
                        })?,
                    None => content.map_or(0, |content| content.len() as u64),
                };
                Entry::file(path, fingerprint, size)
            }
        };
        Ok(parsed)
    }
}

impl TryFrom<&str> for ImageManifest {
    type Error = ManifestError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().context(MalformedManifestSnafu)?;

        let top_level = document
            .as_mapping()
            .ok_or(ManifestError::TopLevelNotMap)?;
        let layers = field(top_level, "layers")
            .and_then(Yaml::as_sequence)
            .ok_or(ManifestError::LayersNotSequence)?;

        let layers = layers
            .iter()
            .enumerate()
            .map(|(index, layer)| Self::parse_layer(index, layer))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ImageManifest { layers })
    }
}

impl AsyncTryFrom<&Path> for ImageManifest {
    type Error = ManifestError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        info!("Reading image manifest: {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        contents.as_str().try_into()
    }
}

fn field<'a, 'input>(
    map: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    name: &str,
) -> Option<&'a Yaml<'input>> {
    map.iter()
        .find(|(key, _)| key.as_str() == Some(name))
        .map(|(_, value)| value)
}

fn text(map: &LinkedHashMap<Yaml, Yaml>, name: &str) -> Option<String> {
    field(map, name).and_then(Yaml::as_str).map(str::to_string)
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[derive(Debug, Snafu)]
pub enum ManifestError {
    #[snafu(display("Failed to read the manifest: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Manifest {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the manifest"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Manifest is empty"))]
    MalformedManifest,
    #[snafu(display("Top level of the manifest should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Manifest 'layers' should be a sequence"))]
    LayersNotSequence,
    #[snafu(display("Layer {} should be a map", layer))]
    LayerNotMap { layer: usize },
    #[snafu(display("Entries of layer {} should be a sequence", layer))]
    EntriesNotSequence { layer: usize },
    #[snafu(display("Entry {} of layer {} should be a map", position, layer))]
    EntryNotMap { layer: usize, position: usize },
    #[snafu(display("Entry {} of layer {} has no path", position, layer))]
    MissingPath { layer: usize, position: usize },
    #[snafu(display("Entry '{}' of layer {} has unknown kind '{}'", path, layer, kind))]
    UnknownKind {
        layer: usize,
        path: String,
        kind: String,
    },
    #[snafu(display("Symlink '{}' of layer {} has no target", path, layer))]
    MissingLinkTarget { layer: usize, path: String },
    #[snafu(display("Entry '{}' of layer {} has an invalid fingerprint", path, layer))]
    InvalidFingerprint {
        layer: usize,
        path: String,
        source: hex::FromHexError,
    },
    #[snafu(display("Entry '{}' of layer {} has an invalid size", path, layer))]
    InvalidSize { layer: usize, path: String },
    #[snafu(display("Layer {} contains an invalid path", layer))]
    InvalidTreePath { layer: usize, source: TreeError },
}
