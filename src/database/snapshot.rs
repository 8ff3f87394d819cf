use crate::database::reference::Reference;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// The data read from a location at one point in time, decoded on demand.
#[derive(Debug, Clone)]
pub struct DataSnapshot {
    reference: Reference,
    raw: Bytes,
}

impl DataSnapshot {
    pub(crate) fn new(reference: Reference, raw: Bytes) -> Self {
        Self { reference, raw }
    }

    /// False when the location holds no data.
    pub fn exists(&self) -> bool {
        self.raw.as_ref() != b"null"
    }

    pub fn val<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.raw)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn key(&self) -> Option<&str> {
        self.reference.key()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }
}
