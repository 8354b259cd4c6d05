use std::fmt::{self, Display};

/// Container that receives quarantined objects.
pub const DEFAULT_QUARANTINE_CONTAINER: &str = "quarantine";

/// Prefix of sharded containers when nothing else is configured.
pub const DEFAULT_SHARD_PREFIX: &str = "benchmark-test";

/// Number of leading digest characters that select the shard container.
pub const SHARD_WIDTH: usize = 4;

/// The destination of an object in the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Placement {
    /// Container (bucket) name.
    pub container: String,
    /// Object key within the container.
    pub object_key: String,
}

impl Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object_key)
    }
}

/// Maps content digests to placements.
///
/// Regular objects land in `<prefix>-<first 4 digest chars>`, which spreads the corpus over at
/// most 65536 containers. Quarantined objects all share one unsharded container. In both cases
/// the object key is the digest itself, so identical content always resolves to the identical
/// object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamingScheme {
    shard_prefix: String,
    quarantine_container: String,
}

impl NamingScheme {
    pub fn new(shard_prefix: impl Into<String>, quarantine_container: impl Into<String>) -> Self {
        Self {
            shard_prefix: shard_prefix.into(),
            quarantine_container: quarantine_container.into(),
        }
    }

    pub fn shard_prefix(&self) -> &str {
        &self.shard_prefix
    }

    pub fn quarantine_container(&self) -> &str {
        &self.quarantine_container
    }

    /// Returns the container a digest belongs to.
    ///
    /// `digest` must be at least [`SHARD_WIDTH`] ASCII characters long. Digests coming from
    /// [`Checksums`](crate::Checksums) always are.
    pub fn container_for(&self, digest: &str, quarantine: bool) -> String {
        if quarantine {
            return self.quarantine_container.clone();
        }

        debug_assert!(
            digest.len() >= SHARD_WIDTH && digest.is_char_boundary(SHARD_WIDTH),
            "digest `{digest}` is too short to shard"
        );
        let shard = digest.get(..SHARD_WIDTH).unwrap_or(digest);
        format!("{}-{shard}", self.shard_prefix)
    }

    /// Returns the full placement of a digest.
    pub fn placement_for(&self, digest: &str, quarantine: bool) -> Placement {
        Placement {
            container: self.container_for(digest, quarantine),
            object_key: digest.to_owned(),
        }
    }
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_PREFIX, DEFAULT_QUARANTINE_CONTAINER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    #[test]
    fn placement_is_deterministic() {
        let naming = NamingScheme::new("bagstore", "quarantine");

        for quarantine in [false, true] {
            assert_eq!(
                naming.placement_for(DIGEST, quarantine),
                naming.placement_for(DIGEST, quarantine)
            );
        }
    }

    #[test]
    fn shards_by_digest_prefix() {
        let naming = NamingScheme::new("bagstore", "quarantine");
        let placement = naming.placement_for(DIGEST, false);

        assert_eq!(placement.container, "bagstore-a94a");
        assert!(placement.container.ends_with(&DIGEST[..4]));
        assert_eq!(placement.object_key, DIGEST);
    }

    #[test]
    fn quarantine_ignores_digest() {
        let naming = NamingScheme::new("bagstore", "isolated");

        for digest in [DIGEST, "0000ffff", "ffff"] {
            let placement = naming.placement_for(digest, true);
            assert_eq!(placement.container, "isolated");
            assert_eq!(placement.object_key, digest);
        }
    }

    #[test]
    fn same_content_same_object_across_schemes() {
        let a = NamingScheme::new("bagstore", "quarantine");
        let b = a.clone();

        assert_eq!(a.placement_for(DIGEST, false), b.placement_for(DIGEST, false));
        assert_eq!(
            a.placement_for(DIGEST, false).to_string(),
            "bagstore-a94a/a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
    }

    #[test]
    fn minimum_length_digest() {
        let naming = NamingScheme::default();
        let placement = naming.placement_for("beef", false);

        assert_eq!(placement.container, format!("{DEFAULT_SHARD_PREFIX}-beef"));
        assert_eq!(placement.object_key, "beef");
    }
}
