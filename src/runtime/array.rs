use rustc_hash::FxHashMap;

use super::Value;

/// An associative array keyed by string.
///
/// Iteration order is unspecified. With the fixed-seed Fx hasher it is
/// deterministic for a given binary and insertion history, which keeps
/// `for (k in a)` output reproducible between runs.
#[derive(Debug, Default, Clone)]
pub struct AwkArray {
    map: FxHashMap<String, Value>,
}

impl AwkArray {
    /// Read an element, creating it uninitialised when absent.
    pub fn get_or_vivify(&mut self, key: &str) -> Value {
        if let Some(v) = self.map.get(key) {
            return v.clone();
        }
        self.map.insert(key.to_string(), Value::default());
        Value::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.map.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of the current keys, for `for (k in a)`.
    pub fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

/// Handle to an array stored in the [`ArrayArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayId(usize);

/// Storage for every array in the program, globals and function locals
/// alike. Variables hold an [`ArrayId`], which is how arrays are passed to
/// functions by reference.
#[derive(Debug, Default)]
pub struct ArrayArena {
    arrays: Vec<AwkArray>,
    free: Vec<usize>,
}

impl ArrayArena {
    pub fn alloc(&mut self) -> ArrayId {
        match self.free.pop() {
            Some(idx) => ArrayId(idx),
            None => {
                self.arrays.push(AwkArray::default());
                ArrayId(self.arrays.len() - 1)
            }
        }
    }

    /// Release an array; its slot is cleared and reused.
    pub fn release(&mut self, id: ArrayId) {
        self.arrays[id.0].clear();
        self.free.push(id.0);
    }

    pub fn get(&self, id: ArrayId) -> &AwkArray {
        &self.arrays[id.0]
    }

    pub fn get_mut(&mut self, id: ArrayId) -> &mut AwkArray {
        &mut self.arrays[id.0]
    }

    pub fn live(&self) -> usize {
        self.arrays.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_missing_key_vivifies() {
        let mut a = AwkArray::default();
        assert!(!a.contains("x"));
        assert_eq!(a.get_or_vivify("x"), Value::default());
        assert!(a.contains("x"));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn keys_are_unique() {
        let mut a = AwkArray::default();
        a.set("k", Value::from_number(1.0));
        a.set("k", Value::from_number(2.0));
        assert_eq!(a.len(), 1);
        assert_eq!(a.get("k"), Some(&Value::from_number(2.0)));
    }

    #[test]
    fn arena_reuses_released_slots() {
        let mut arena = ArrayArena::default();
        let a = arena.alloc();
        arena.get_mut(a).set("k", Value::from_number(1.0));
        arena.release(a);
        let b = arena.alloc();
        assert_eq!(a, b);
        assert!(arena.get(b).is_empty());
        assert_eq!(arena.live(), 1);
    }
}
