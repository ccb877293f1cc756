use std::collections::HashMap;

use prost_types::Any;

/// A named bundle of packed resource payloads for one type URL.
///
/// Payloads are opaque from this crate's point of view — they are
/// already-encoded `google.protobuf.Any` values produced by whatever code
/// assembles the operator's configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub items: HashMap<String, Any>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter<I: IntoIterator<Item = (String, Any)>>(iter: I) -> Self {
        Self { items: iter.into_iter().collect() }
    }

    pub fn insert(&mut self, name: impl Into<String>, any: Any) {
        self.items.insert(name.into(), any);
    }

    pub fn get(&self, name: &str) -> Option<&Any> {
        self.items.get(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
