use keydeck_api::{KeyDescriptor, KeyType};

use crate::error::CoreError;

/// Leaf node: one stored key.
///
/// No async behavior of its own. The enabled flag is decided once at
/// load time from the key's type and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNode {
    name: String,
    key_type: KeyType,
    enabled: bool,
    preview: Option<String>,
}

impl KeyNode {
    pub(crate) fn from_descriptor(descriptor: KeyDescriptor) -> Self {
        let enabled = descriptor.key_type.openable();
        Self {
            name: descriptor.name,
            key_type: descriptor.key_type,
            enabled,
            preview: descriptor.preview,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_type(&self) -> &KeyType {
        &self.key_type
    }

    /// `false` for binary/unsupported types that no viewer can open.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    /// Request a viewer tab for this key. Fails with
    /// [`CoreError::Disabled`] when the key cannot be opened; the tree
    /// itself is never mutated.
    pub fn open(&self, new_tab: bool) -> Result<OpenKeyRequest, CoreError> {
        if !self.enabled {
            return Err(CoreError::Disabled {
                key: self.name.clone(),
            });
        }
        Ok(OpenKeyRequest {
            name: self.name.clone(),
            key_type: self.key_type.clone(),
            new_tab,
        })
    }
}

/// What the tab layer needs to materialize a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenKeyRequest {
    pub name: String,
    pub key_type: KeyType,
    pub new_tab: bool,
}
