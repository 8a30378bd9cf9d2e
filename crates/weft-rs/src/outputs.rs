//! Named outputs collected while a prompt is consumed.
//!
//! Outputs form a tree keyed by [`Context::output_address`](crate::context::Context).
//! An address segment that parses as an integer indexes into a list of
//! nested outputs, which is how loop iterations keep their results apart:
//! `["chat", "1", "answer"]` addresses `outputs.chat[1].answer`.
//!
//! A list grows at most [`MAX_INDEX_GAP`] entries past its end in one write;
//! writes addressed further out are dropped with a warning.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How far past the end of a nested list a numeric segment may point.
pub const MAX_INDEX_GAP: usize = 1024;

/// A value stored under one output key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Text(String),
    TextList(Vec<String>),
    Nested(Outputs),
    NestedList(Vec<Outputs>),
}

impl OutputValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Recursive key → value mapping of generated outputs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs(BTreeMap<String, OutputValue>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&OutputValue> {
        self.0.get(key)
    }

    /// Text stored directly under `key`, if any.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OutputValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OutputValue)> {
        self.0.iter()
    }

    /// Follow `path` through nested outputs and lists.
    pub fn lookup(&self, path: &[&str]) -> Option<&OutputValue> {
        let (key, rest) = path.split_first()?;
        lookup_in(self.0.get(*key)?, rest)
    }

    /// Store `value` under `key` at `address`, creating intermediate levels.
    pub fn insert_at(&mut self, address: &[String], key: &str, value: OutputValue) {
        match descend_mut(self, address) {
            Some(outputs) => {
                outputs.0.insert(key.to_string(), value);
            }
            None => warn!(?address, key, "Output address index out of range, value dropped"),
        }
    }
}

fn lookup_in<'a>(value: &'a OutputValue, path: &[&str]) -> Option<&'a OutputValue> {
    if path.is_empty() {
        return Some(value);
    }
    match value {
        OutputValue::Nested(outputs) => outputs.lookup(path),
        OutputValue::NestedList(list) => {
            let (index, rest) = path.split_first()?;
            list.get(index.parse::<usize>().ok()?)?.lookup(rest)
        }
        OutputValue::Text(_) | OutputValue::TextList(_) => None,
    }
}

fn descend_mut<'a>(outputs: &'a mut Outputs, address: &[String]) -> Option<&'a mut Outputs> {
    let Some((key, rest)) = address.split_first() else {
        return Some(outputs);
    };
    let indexed = rest
        .split_first()
        .and_then(|(index, tail)| index.parse::<usize>().ok().map(|index| (index, tail)));

    match indexed {
        Some((index, tail)) => {
            let entry = outputs
                .0
                .entry(key.clone())
                .or_insert_with(|| OutputValue::NestedList(Vec::new()));
            let list = as_nested_list(key, entry);
            if index > list.len() + MAX_INDEX_GAP {
                return None;
            }
            if list.len() <= index {
                list.resize_with(index + 1, Outputs::default);
            }
            descend_mut(&mut list[index], tail)
        }
        None => {
            let entry = outputs
                .0
                .entry(key.clone())
                .or_insert_with(|| OutputValue::Nested(Outputs::default()));
            descend_mut(as_nested(key, entry), rest)
        }
    }
}

fn as_nested_list<'a>(key: &str, value: &'a mut OutputValue) -> &'a mut Vec<Outputs> {
    if !matches!(value, OutputValue::NestedList(_)) {
        warn!(key, "Replacing output value with a list of nested outputs");
        *value = OutputValue::NestedList(Vec::new());
    }
    match value {
        OutputValue::NestedList(list) => list,
        _ => unreachable!("value was just replaced with a nested list"),
    }
}

fn as_nested<'a>(key: &str, value: &'a mut OutputValue) -> &'a mut Outputs {
    if !matches!(value, OutputValue::Nested(_)) {
        warn!(key, "Replacing output value with nested outputs");
        *value = OutputValue::Nested(Outputs::default());
    }
    match value {
        OutputValue::Nested(outputs) => outputs,
        _ => unreachable!("value was just replaced with nested outputs"),
    }
}

/// Outputs shared by every node of one run.
#[derive(Clone, Default)]
pub struct SharedOutputs(Arc<Mutex<Outputs>>);

impl SharedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Outputs> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_at(&self, address: &[String], key: &str, value: OutputValue) {
        self.lock().insert_at(address, key, value);
    }

    pub fn snapshot(&self) -> Outputs {
        self.lock().clone()
    }
}

impl std::fmt::Debug for SharedOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedOutputs").field(&*self.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_at_root() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&[], "name", OutputValue::Text("Ada".into()));
        assert_eq!(outputs.text("name"), Some("Ada"));
    }

    #[test]
    fn insert_nested_creates_levels() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&addr(&["profile"]), "age", OutputValue::Text("36".into()));
        let value = outputs.lookup(&["profile", "age"]).unwrap();
        assert_eq!(value.as_text(), Some("36"));
    }

    #[test]
    fn numeric_segment_indexes_list() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&addr(&["chat", "1"]), "answer", OutputValue::Text("b".into()));
        outputs.insert_at(&addr(&["chat", "0"]), "answer", OutputValue::Text("a".into()));

        let Some(OutputValue::NestedList(list)) = outputs.get("chat") else {
            panic!("expected list of outputs");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].text("answer"), Some("a"));
        assert_eq!(list[1].text("answer"), Some("b"));
        assert_eq!(
            outputs.lookup(&["chat", "1", "answer"]).and_then(|v| v.as_text()),
            Some("b")
        );
    }

    #[test]
    fn far_out_index_is_dropped() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&addr(&["chat", "99999999999"]), "answer", OutputValue::Text("x".into()));
        assert!(outputs.lookup(&["chat", "99999999999", "answer"]).is_none());
        let Some(OutputValue::NestedList(list)) = outputs.get("chat") else {
            panic!("expected list of outputs");
        };
        assert!(list.is_empty());

        let gap = MAX_INDEX_GAP.to_string();
        outputs.insert_at(&addr(&["chat", gap.as_str()]), "answer", OutputValue::Text("y".into()));
        assert_eq!(
            outputs.lookup(&["chat", gap.as_str(), "answer"]).and_then(OutputValue::as_text),
            Some("y")
        );
    }

    #[test]
    fn nesting_under_text_replaces_it() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&[], "turn", OutputValue::Text("old".into()));
        outputs.insert_at(&addr(&["turn"]), "reply", OutputValue::Text("new".into()));
        assert_eq!(
            outputs.lookup(&["turn", "reply"]).and_then(OutputValue::as_text),
            Some("new")
        );
    }

    #[test]
    fn lookup_missing_path_is_none() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&[], "x", OutputValue::Text("1".into()));
        assert!(outputs.lookup(&["x", "y"]).is_none());
        assert!(outputs.lookup(&["nope"]).is_none());
        assert!(outputs.lookup(&[]).is_none());
    }

    #[test]
    fn serializes_as_plain_json_tree() {
        let mut outputs = Outputs::new();
        outputs.insert_at(&addr(&["loop", "0"]), "a", OutputValue::Text("x".into()));
        outputs.insert_at(&[], "choices", OutputValue::TextList(vec!["p".into(), "q".into()]));
        let json = serde_json::to_value(&outputs).unwrap();
        assert_eq!(json["loop"][0]["a"], "x");
        assert_eq!(json["choices"][1], "q");
    }

    #[test]
    fn shared_outputs_snapshot() {
        let shared = SharedOutputs::new();
        let other = shared.clone();
        other.insert_at(&[], "k", OutputValue::Text("v".into()));
        assert_eq!(shared.snapshot().text("k"), Some("v"));
    }
}
