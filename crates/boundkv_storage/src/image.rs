//! In-memory image of one database: its version and containers.

use crate::engine::Schema;
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk format of a [`DatabaseImage`].
pub const IMAGE_FORMAT: u16 = 1;

/// Entries of a single container, ordered by key.
pub type Entries = BTreeMap<String, String>;

/// The complete state of one database.
///
/// Version 0 means the database has never been initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseImage {
    /// Encoding format marker.
    pub format: u16,
    /// Schema version.
    pub version: u32,
    /// Containers by name.
    pub containers: BTreeMap<String, Entries>,
}

impl DatabaseImage {
    /// Creates an empty, uninitialized image.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format: IMAGE_FORMAT,
            version: 0,
            containers: BTreeMap::new(),
        }
    }

    /// Returns the entries of a container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerNotFound` if the container does not exist.
    pub fn entries(&self, container: &str) -> StorageResult<&Entries> {
        self.containers
            .get(container)
            .ok_or_else(|| StorageError::container_not_found(container))
    }

    /// Returns the entries of a container for mutation.
    ///
    /// # Errors
    ///
    /// Returns `ContainerNotFound` if the container does not exist.
    pub fn entries_mut(&mut self, container: &str) -> StorageResult<&mut Entries> {
        self.containers
            .get_mut(container)
            .ok_or_else(|| StorageError::container_not_found(container))
    }

    /// Encodes the image as CBOR.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if encoding fails.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StorageError::Corrupted(format!("encode failed: {e}")))?;
        Ok(bytes)
    }

    /// Decodes an image previously produced by [`DatabaseImage::encode`].
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the bytes are not a valid image.
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let image: Self = ciborium::from_reader(bytes)
            .map_err(|e| StorageError::Corrupted(format!("decode failed: {e}")))?;
        if image.format != IMAGE_FORMAT {
            return Err(StorageError::Corrupted(format!(
                "unsupported image format {}",
                image.format
            )));
        }
        Ok(image)
    }
}

impl Schema for DatabaseImage {
    fn version(&self) -> u32 {
        self.version
    }

    fn container_names(&self) -> Vec<String> {
        self.containers.keys().cloned().collect()
    }

    fn has_container(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    fn create_container(&mut self, name: &str) -> StorageResult<()> {
        if self.containers.contains_key(name) {
            return Err(StorageError::container_exists(name));
        }
        self.containers.insert(name.to_string(), Entries::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_is_uninitialized() {
        let image = DatabaseImage::new();
        assert_eq!(image.version, 0);
        assert!(image.container_names().is_empty());
    }

    #[test]
    fn create_container_twice_fails() {
        let mut image = DatabaseImage::new();
        image.create_container("state").unwrap();
        let result = image.create_container("state");
        assert!(matches!(result, Err(StorageError::ContainerExists { .. })));
    }

    #[test]
    fn missing_container_is_reported() {
        let image = DatabaseImage::new();
        assert!(matches!(
            image.entries("state"),
            Err(StorageError::ContainerNotFound { .. })
        ));
    }

    #[test]
    fn encode_then_decode_preserves_entries() {
        let mut image = DatabaseImage::new();
        image.version = 3;
        image.create_container("state").unwrap();
        image
            .entries_mut("state")
            .unwrap()
            .insert("last-update".into(), "1700000000000".into());

        let decoded = DatabaseImage::decode(&image.encode().unwrap()).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn decode_garbage_is_corruption() {
        let result = DatabaseImage::decode(b"\xff\x00not cbor");
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn decode_rejects_unknown_format() {
        let mut image = DatabaseImage::new();
        image.format = 99;
        let result = DatabaseImage::decode(&image.encode().unwrap());
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }
}
