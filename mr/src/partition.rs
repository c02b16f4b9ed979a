//! Routing of map output to reduce buckets, and grouping of reduce input.

use std::hash::Hasher;

use crate::KeyValue;

/// Hashes an intermediate key: 64-bit FNV-1a, low 31 bits. Workers agree on a
/// key's bucket only because every process computes the same value here.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

pub fn bucket(key: &str, n_reduce: usize) -> usize {
    ihash(key) as usize % n_reduce
}

/// Splits `pairs` into exactly `n_reduce` buckets, keeping emit order inside
/// each bucket.
pub fn partition(pairs: Vec<KeyValue>, n_reduce: usize) -> Vec<Vec<KeyValue>> {
    assert!(n_reduce > 0, "n_reduce must be positive");
    let mut buckets = vec![Vec::new(); n_reduce];
    for kv in pairs {
        buckets[bucket(&kv.key, n_reduce)].push(kv);
    }
    buckets
}

pub fn sort_by_key(pairs: &mut [KeyValue]) {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
}

/// One group per maximal run of equal keys. `sorted` must already be sorted
/// by key.
pub fn group_by_key(sorted: Vec<KeyValue>) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = vec![];
    for KeyValue { key, value } in sorted {
        if let Some((last, values)) = groups.last_mut() {
            if *last == key {
                values.push(value);
                continue;
            }
        }
        groups.push((key, vec![value]));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn words(text: &str) -> Vec<KeyValue> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, w)| KeyValue::new(w, i.to_string()))
            .collect()
    }

    #[test]
    fn test_ihash_is_deterministic() {
        for key in ["", "the", "quick", "fox", "Ünïcode"] {
            assert_eq!(ihash(key), ihash(key));
            assert!(ihash(key) <= 0x7fff_ffff);
        }
        assert_ne!(ihash("the"), ihash("thE"));
    }

    #[test]
    fn test_ihash_known_values() {
        // FNV-1a 64 of "" is 0xcbf29ce484222325 and of "a" is 0xaf63dc4c8601ec8c.
        assert_eq!(ihash(""), 0x0422_2325);
        assert_eq!(ihash("a"), 0x0601_ec8c);
    }

    #[test]
    fn test_partition_routes_by_hash() {
        let pairs = words("the quick fox the lazy dog jumps over the fence");
        for n_reduce in 1..6 {
            let buckets = partition(pairs.clone(), n_reduce);
            assert_eq!(buckets.len(), n_reduce);
            assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), pairs.len());
            for (i, b) in buckets.iter().enumerate() {
                assert!(b.iter().all(|kv| bucket(&kv.key, n_reduce) == i));
            }
            assert_eq!(buckets, partition(pairs.clone(), n_reduce));
        }
    }

    #[test]
    fn test_partition_keeps_emit_order() {
        let pairs = words("a a a a");
        let buckets = partition(pairs.clone(), 3);
        assert_eq!(buckets[bucket("a", 3)], pairs);
    }

    #[test]
    fn test_partition_spreads_keys() {
        let pairs: Vec<KeyValue> = (0..1000)
            .map(|i| KeyValue::new(format!("key-{}", i), "1"))
            .collect();
        let buckets = partition(pairs, 4);
        assert!(buckets.iter().all(|b| b.len() > 100));
    }

    #[test]
    fn test_group_by_key() {
        let mut pairs = words("the quick fox the lazy dog the end");
        sort_by_key(&mut pairs);
        let groups = group_by_key(pairs.clone());

        let keys: Vec<&str> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["dog", "end", "fox", "lazy", "quick", "the"]);

        let mut expected: HashMap<String, Vec<String>> = HashMap::new();
        for kv in pairs {
            expected.entry(kv.key).or_default().push(kv.value);
        }
        for (key, values) in groups {
            assert_eq!(expected.remove(&key), Some(values));
        }
        assert!(expected.is_empty());
    }

    #[test]
    fn test_group_by_key_empty() {
        assert!(group_by_key(vec![]).is_empty());
    }
}
