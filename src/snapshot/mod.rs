//! The immutable, per-node-group, per-type versioned resource bundle.

mod resources;
pub mod type_url;

use std::collections::HashMap;

pub use resources::Resources;

/// An immutable mapping `type_url -> (version, resources)`.
///
/// A `Snapshot` never changes after construction: `SnapshotCache::set_snapshot`
/// replaces the whole entry for a node group rather than mutating one in
/// place — an update never mutates an existing snapshot, it replaces the
/// entry atomically.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    by_type: HashMap<String, VersionedResources>,
}

#[derive(Clone, Debug)]
struct VersionedResources {
    version: String,
    resources: Resources,
}

impl Snapshot {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns `""` if `type_url` is absent from this snapshot.
    pub fn version(&self, type_url: &str) -> &str {
        self.by_type.get(type_url).map(|v| v.version.as_str()).unwrap_or("")
    }

    /// Returns `None` if `type_url` is absent; callers that want "empty" on
    /// absence should use [`Snapshot::resources_or_empty`].
    pub fn resources(&self, type_url: &str) -> Option<&Resources> {
        self.by_type.get(type_url).map(|v| &v.resources)
    }

    pub fn resources_or_empty(&self, type_url: &str) -> &Resources {
        static EMPTY: std::sync::OnceLock<Resources> = std::sync::OnceLock::new();
        self.resources(type_url).unwrap_or_else(|| EMPTY.get_or_init(Resources::new))
    }
}

/// Builds a [`Snapshot`] one resource type at a time. Matches the
/// constructor pattern go/java control-planes expose (`NewSnapshot`),
/// adapted into an idiomatic Rust builder.
#[derive(Default)]
pub struct Builder {
    by_type: HashMap<String, VersionedResources>,
}

impl Builder {
    pub fn with_resources(
        mut self,
        type_url: impl Into<String>,
        version: impl Into<String>,
        resources: Resources,
    ) -> Self {
        self.by_type.insert(type_url.into(), VersionedResources { version: version.into(), resources });
        self
    }

    /// Like [`Builder::with_resources`], but derives the version from a
    /// SHA-256 of the type's resource contents instead of taking one
    /// explicitly. Convenient for operators who assemble resources from a
    /// config source with no natural version counter of its own — distinct
    /// contents are guaranteed distinct strings, which is all §4.2 requires
    /// of a version scheme.
    pub fn with_hashed_resources(mut self, type_url: impl Into<String>, resources: Resources) -> Self {
        let version = hash_resources(&resources);
        self.by_type.insert(type_url.into(), VersionedResources { version, resources });
        self
    }

    pub fn build(self) -> Snapshot {
        Snapshot { by_type: self.by_type }
    }
}

/// Hashes a resource bundle's names and packed payloads, sorted by name so
/// the result doesn't depend on the bundle's hash-map iteration order.
fn hash_resources(resources: &Resources) -> String {
    use sha2::{Digest, Sha256};

    let mut names: Vec<&String> = resources.items.keys().collect();
    names.sort();

    let mut hasher = Sha256::new();
    for name in names {
        let any = &resources.items[name];
        hasher.update(name.as_bytes());
        hasher.update(any.type_url.as_bytes());
        hasher.update(&any.value);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_type_returns_empty_version_and_resources() {
        let snapshot = Snapshot::builder().build();
        assert_eq!(snapshot.version(type_url::CLUSTER), "");
        assert!(snapshot.resources(type_url::CLUSTER).is_none());
        assert!(snapshot.resources_or_empty(type_url::CLUSTER).is_empty());
    }

    #[test]
    fn builder_tracks_version_per_type() {
        let snapshot = Snapshot::builder()
            .with_resources(type_url::CLUSTER, "v1", Resources::new())
            .with_resources(type_url::ROUTE, "v7", Resources::new())
            .build();
        assert_eq!(snapshot.version(type_url::CLUSTER), "v1");
        assert_eq!(snapshot.version(type_url::ROUTE), "v7");
        assert_eq!(snapshot.version(type_url::ENDPOINT), "");
    }

    #[test]
    fn hashed_resources_are_order_independent_and_content_sensitive() {
        use prost_types::Any;

        let mut forward = Resources::new();
        forward.insert("a", Any { type_url: type_url::CLUSTER.to_string(), value: b"a".to_vec() });
        forward.insert("b", Any { type_url: type_url::CLUSTER.to_string(), value: b"b".to_vec() });

        let mut backward = Resources::new();
        backward.insert("b", Any { type_url: type_url::CLUSTER.to_string(), value: b"b".to_vec() });
        backward.insert("a", Any { type_url: type_url::CLUSTER.to_string(), value: b"a".to_vec() });

        let one = Snapshot::builder().with_hashed_resources(type_url::CLUSTER, forward).build();
        let two = Snapshot::builder().with_hashed_resources(type_url::CLUSTER, backward).build();
        assert_eq!(one.version(type_url::CLUSTER), two.version(type_url::CLUSTER));
        assert!(!one.version(type_url::CLUSTER).is_empty());

        let mut changed = Resources::new();
        changed.insert("a", Any { type_url: type_url::CLUSTER.to_string(), value: b"different".to_vec() });
        let three = Snapshot::builder().with_hashed_resources(type_url::CLUSTER, changed).build();
        assert_ne!(one.version(type_url::CLUSTER), three.version(type_url::CLUSTER));
    }
}
