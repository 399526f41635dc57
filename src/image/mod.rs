//! Loading the layers of an image from a YAML manifest.

mod manifest;

pub use manifest::{ImageManifest, Layer, ManifestError};
