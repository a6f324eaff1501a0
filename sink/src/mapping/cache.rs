use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::ConvertingCodec;

/// Codecs resolved for one table and one pair of payload schemas.
#[derive(Debug, Clone)]
pub struct ResolvedCodecs {
    /// One codec per field-mapped column, in mapping order.
    pub columns: Vec<Arc<ConvertingCodec>>,
    pub ttl: Option<Arc<ConvertingCodec>>,
    pub timestamp: Option<Arc<ConvertingCodec>>,
}

/// Key of a [`ShapeCache`] entry: table, then key and value schema fingerprints.
///
/// Schemaless payloads have no fingerprint.
pub type ShapeKey = (String, Option<u64>, Option<u64>);

/// Resolved codecs keyed by table and payload schema fingerprints.
///
/// Records of one topic usually share a handful of schemas, so codec resolution happens once per
/// distinct schema rather than once per record. The cache is created by the owner of the
/// resolver and can be shared between resolvers.
#[derive(Debug, Default)]
pub struct ShapeCache {
    entries: Mutex<HashMap<ShapeKey, Arc<ResolvedCodecs>>>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ShapeKey) -> Option<Arc<ResolvedCodecs>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores resolved codecs, keeping the first entry when another thread raced this one.
    pub fn insert(&self, key: ShapeKey, codecs: ResolvedCodecs) -> Arc<ResolvedCodecs> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| Arc::new(codecs))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
