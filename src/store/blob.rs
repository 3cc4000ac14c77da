//! Blob type - the unit of content-addressed storage

use serde::{Deserialize, Serialize};

/// Default zstd level for stored blobs
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Type tag for blobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobType {
    /// A tree leaf (key and value records)
    Leaf,
    /// An internal tree node (two child identities)
    Internal,
    /// A namespace version record
    Version,
}

impl BlobType {
    pub fn as_byte(&self) -> u8 {
        match self {
            BlobType::Leaf => 0,
            BlobType::Internal => 1,
            BlobType::Version => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BlobType::Leaf),
            1 => Some(BlobType::Internal),
            2 => Some(BlobType::Version),
            _ => None,
        }
    }
}

/// A blob is a typed chunk of data, compressed when written to disk
///
/// Blobs do not hash themselves: the caller supplies the identity they are
/// stored under, which for tree nodes is the node's merkle identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    /// Type of content
    pub blob_type: BlobType,
    /// Raw data (uncompressed)
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob
    pub fn new(blob_type: BlobType, data: Vec<u8>) -> Self {
        Blob { blob_type, data }
    }

    /// Compress the blob for storage
    pub fn compress(&self, level: i32) -> crate::Result<Vec<u8>> {
        let mut output = Vec::new();
        // Type byte prefix
        output.push(self.blob_type.as_byte());
        let compressed = zstd::encode_all(self.data.as_slice(), level)?;
        output.extend(compressed);
        Ok(output)
    }

    /// Decompress a blob from storage
    pub fn decompress(data: &[u8]) -> crate::Result<Self> {
        if data.is_empty() {
            return Err(crate::Error::Corruption("Empty blob data".into()));
        }

        let blob_type = BlobType::from_byte(data[0])
            .ok_or_else(|| crate::Error::Corruption(format!("Invalid blob type: {}", data[0])))?;

        let decompressed = zstd::decode_all(&data[1..])?;

        Ok(Blob {
            blob_type,
            data: decompressed,
        })
    }

    /// Get the size of the uncompressed data
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_compress_keeps_type() {
        let original = Blob::new(BlobType::Internal, vec![7u8; 64]);
        let compressed = original.compress(DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(compressed[0], BlobType::Internal.as_byte());

        let restored = Blob::decompress(&compressed).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_decompress_rejects_bad_type() {
        let err = Blob::decompress(&[9, 0, 0]).unwrap_err();
        assert!(matches!(err, crate::Error::Corruption(_)));
        assert!(Blob::decompress(&[]).is_err());
    }
}
