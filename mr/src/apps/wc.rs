//! Word count.

use crate::KeyValue;

/// Emits `(word, "1")` for every maximal run of letters.
pub fn map(_filename: &str, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .map(|word| KeyValue::new(word, "1"))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    let count: u64 = values
        .iter()
        .filter_map(|value| value.parse::<u64>().ok())
        .sum();
    count.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_splits_on_non_letters() {
        let kva = map("pg.txt", "The fox's den, the-end 42 ok");
        let words: Vec<&str> = kva.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(words, vec!["The", "fox", "s", "den", "the", "end", "ok"]);
        assert!(kva.iter().all(|kv| kv.value == "1"));
    }

    #[test]
    fn test_reduce_sums() {
        let values = vec!["1".to_string(), "1".to_string(), "3".to_string()];
        assert_eq!(reduce("the", &values), "5");
    }
}
