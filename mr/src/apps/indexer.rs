//! Inverted index: for every word, the documents it appears in.

use std::collections::BTreeSet;

use crate::KeyValue;

pub fn map(document: &str, contents: &str) -> Vec<KeyValue> {
    let words: BTreeSet<&str> = contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .collect();
    words
        .into_iter()
        .map(|word| KeyValue::new(word, document))
        .collect()
}

/// `<number of documents> <doc,doc,...>` with documents sorted.
pub fn reduce(_key: &str, values: &[String]) -> String {
    let documents: BTreeSet<&str> = values.iter().map(String::as_str).collect();
    let list: Vec<&str> = documents.into_iter().collect();
    format!("{} {}", list.len(), list.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_emits_each_word_once() {
        let kva = map("a.txt", "to be or not to be");
        let words: Vec<&str> = kva.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(words, vec!["be", "not", "or", "to"]);
        assert!(kva.iter().all(|kv| kv.value == "a.txt"));
    }

    #[test]
    fn test_reduce_dedups_documents() {
        let values: Vec<String> = ["b.txt", "a.txt", "b.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(reduce("word", &values), "2 a.txt,b.txt");
    }
}
