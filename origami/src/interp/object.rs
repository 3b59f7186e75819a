//! Property bags for objects and class instances

use super::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Insertion-ordered property map behind one lock.
///
/// Spawned units may touch the same object, so every access goes through
/// the mutex. Iteration always works on a snapshot.
#[derive(Default)]
pub struct ObjectValue {
    props: Mutex<IndexMap<String, Value>>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        ObjectValue {
            props: Mutex::new(entries.into_iter().collect()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.props.lock().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.props.lock().contains_key(name)
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.props.lock().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.props.lock().shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.props.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.lock().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.props
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Shallow copy with independent storage.
    pub fn duplicate(&self) -> Self {
        ObjectValue::from_entries(self.entries())
    }

    pub fn loose_eq(&self, other: &ObjectValue) -> bool {
        let (a, b) = (self.entries(), other.entries());
        a.len() == b.len()
            && a.iter()
                .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v.loose_eq(v2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insertion_order_is_kept() {
        let obj = ObjectValue::new();
        obj.set("b", Value::Int(1));
        obj.set("a", Value::Int(2));
        obj.set("b", Value::Int(3));
        assert_eq!(obj.keys(), vec!["b", "a"]);
        assert!(matches!(obj.get("b"), Some(Value::Int(3))));
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let obj = ObjectValue::from_entries([
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
            ("z".to_string(), Value::Int(3)),
        ]);
        obj.remove("x");
        assert_eq!(obj.keys(), vec!["y", "z"]);
    }

    #[test]
    fn test_concurrent_writers() {
        let obj = Arc::new(ObjectValue::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let obj = obj.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        obj.set(format!("k{i}_{j}"), Value::Int(j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(obj.len(), 200);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let obj = ObjectValue::new();
        obj.set("a", Value::Int(1));
        let copy = obj.duplicate();
        copy.set("a", Value::Int(2));
        assert!(matches!(obj.get("a"), Some(Value::Int(1))));
    }
}
