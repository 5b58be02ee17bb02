//! Deterministic resource hashing.
//!
//! Entries are grouped by the resource that produced them. Resources are
//! unordered string maps, so the grouping key is a 64-bit FNV-1a hash over
//! the sorted, escaped key/value pairs.

use fnv::FnvHasher;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hasher;

/// Terminates every key and every value. Never valid inside UTF-8.
const PAIR_SEPARATOR: u8 = 0xfe;

/// Prefixes literal separator and escape bytes inside keys and values.
const ESCAPE: u8 = 0xff;

/// Grouping key for a resource map.
///
/// Equal maps (as sets of pairs) always produce equal ids, regardless of
/// iteration order, and an absent map hashes like an empty one.
///
/// # Example
///
/// ```
/// use ingest::resource::ResourceId;
/// use std::collections::HashMap;
///
/// let a = HashMap::from([("host".to_string(), "a".to_string())]);
/// assert_eq!(ResourceId::of(&a), ResourceId::of(&a.clone()));
/// assert_eq!(ResourceId::from_optional(None), ResourceId::of(&HashMap::new()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Hashes a resource map.
    #[must_use]
    pub fn of(resource: &HashMap<String, String>) -> Self {
        let mut pairs: Vec<(&[u8], &[u8])> = resource
            .iter()
            .map(|(k, v)| (k.as_bytes(), v.as_bytes()))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        Self::from_sorted_pairs(&pairs)
    }

    /// Hashes a resource map that may be absent.
    #[must_use]
    pub fn from_optional(resource: Option<&HashMap<String, String>>) -> Self {
        resource.map_or_else(|| Self::from_sorted_pairs(&[]), Self::of)
    }

    /// Returns the raw hash value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    fn from_sorted_pairs(pairs: &[(&[u8], &[u8])]) -> Self {
        let mut hasher = FnvHasher::default();
        let mut escaped = Vec::with_capacity(64);

        for (key, value) in pairs {
            append_escaped(&mut escaped, key);
            hasher.write(&escaped);
            hasher.write_u8(PAIR_SEPARATOR);

            append_escaped(&mut escaped, value);
            hasher.write(&escaped);
            hasher.write_u8(PAIR_SEPARATOR);
        }

        Self(hasher.finish())
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Clears `buf` and fills it with `bytes`, doubling up separator and escape bytes.
fn append_escaped(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.clear();
    buf.reserve(bytes.len());
    for &b in bytes {
        if b == ESCAPE || b == PAIR_SEPARATOR {
            buf.push(ESCAPE);
        }
        buf.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn resource(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn raw(pairs: &[(&[u8], &[u8])]) -> ResourceId {
        let mut sorted = pairs.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
        ResourceId::from_sorted_pairs(&sorted)
    }

    fn typical() -> HashMap<String, String> {
        resource(&[
            ("file.name", "filename.log"),
            ("file.directory", "/some_directory"),
            ("host.name", "localhost"),
            ("host.ip", "192.168.1.12"),
            ("k8s.pod.name", "test-pod-123zwe1"),
            ("k8s.node.name", "aws-us-east-1.asfasf.aws.com"),
            ("k8s.container.id", "192end1yu823aocajsiocjnasd"),
            ("k8s.cluster.name", "my-cluster"),
        ])
    }

    #[test]
    fn test_empty_and_absent_are_equal() {
        assert_eq!(
            ResourceId::from_optional(None),
            ResourceId::of(&HashMap::new())
        );
        assert_eq!(
            ResourceId::from_optional(Some(&HashMap::new())),
            ResourceId::from_optional(None)
        );
    }

    #[test]
    fn test_empty_is_fnv_offset_basis() {
        assert_eq!(ResourceId::of(&HashMap::new()).value(), 0xcbf2_9ce4_8422_2325);
    }

    #[test]
    fn test_curated_resources_do_not_collide() {
        let cases = vec![
            ("typical", ResourceId::of(&typical())),
            (
                "empty value/key",
                ResourceId::of(&resource(&[("SomeKey", ""), ("", "Ooops")])),
            ),
            (
                "empty value/key reversed",
                ResourceId::of(&resource(&[("", "SomeKey"), ("Ooops", "")])),
            ),
            (
                "ambiguous 1",
                ResourceId::of(&resource(&[("AB", "CD"), ("EF", "G")])),
            ),
            (
                "ambiguous 2",
                ResourceId::of(&resource(&[("ABC", "DE"), ("F", "G")])),
            ),
            (
                "ambiguous 3",
                raw(&[(&b"ABC"[..], &b"DE\xfe"[..]), (&b"F"[..], &b"G"[..])]),
            ),
            (
                "ambiguous 4",
                raw(&[(&b"ABC"[..], &b"DE"[..]), (&b"\xfeF"[..], &b"G"[..])]),
            ),
            (
                "non-utf8 bytes",
                raw(&[
                    (&b"SomeKey"[..], &b"Value\xc0\xc1\xd4\xff\xfe"[..]),
                    (&b"\xff\xfe"[..], &b"Ooops"[..]),
                ]),
            ),
            ("absent", ResourceId::from_optional(None)),
            (
                "long value",
                ResourceId::of(&resource(&[(
                    "key",
                    "This is a really long resource value; It's so long that the pre-allocated buffer size doesn't hold it.",
                )])),
            ),
        ];

        for (i, (name_a, id_a)) in cases.iter().enumerate() {
            for (name_b, id_b) in &cases[i + 1..] {
                assert_ne!(id_a, id_b, "{name_a} and {name_b} collided");
            }
        }
    }

    #[test]
    fn test_escaping_doubles_special_bytes() {
        let mut buf = Vec::new();
        append_escaped(&mut buf, b"A\xfeB\xffC");
        assert_eq!(buf, b"A\xff\xfeB\xff\xffC");

        append_escaped(&mut buf, b"plain");
        assert_eq!(buf, b"plain");
    }

    #[test]
    fn test_display_is_hex() {
        let id = ResourceId::of(&HashMap::new());
        assert_eq!(id.to_string(), "cbf29ce484222325");
    }

    proptest! {
        #[test]
        fn prop_hash_ignores_insertion_order(
            pairs in prop::collection::vec(("[a-z.]{0,8}", "[ -~]{0,12}"), 0..12)
        ) {
            let forward: HashMap<String, String> = pairs.into_iter().collect();
            let mut entries: Vec<(String, String)> = forward.clone().into_iter().collect();
            entries.reverse();
            let reversed: HashMap<String, String> = entries.into_iter().collect();

            prop_assert_eq!(ResourceId::of(&forward), ResourceId::of(&reversed));
        }
    }
}
