//! Structural state diffs over the JSON state tree.
//!
//! Snapshots and diffs are value-typed: once emitted they are never mutated.
//! `serde_json`'s map is BTree-backed, so serializing any state tree or diff
//! yields canonical bytes and the checksums below are deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::errors::DiffError;

const DIFF_DOMAIN: &[u8] = b"holdem_core/sync/diff/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffOpKind {
    Set,
    Delete,
    Increment,
    Decrement,
    Append,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    /// Key sequence from the state-tree root.
    pub path: Vec<String>,
    pub op: DiffOpKind,
    pub value: Option<Value>,
    pub previous_value: Option<Value>,
}

impl DiffOp {
    pub fn set(path: &[&str], value: Value) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Set,
            value: Some(value),
            previous_value: None,
        }
    }

    pub fn delete(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Delete,
            value: None,
            previous_value: None,
        }
    }

    pub fn increment(path: &[&str], by: u64) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Increment,
            value: Some(Value::from(by)),
            previous_value: None,
        }
    }

    pub fn decrement(path: &[&str], by: u64) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Decrement,
            value: Some(Value::from(by)),
            previous_value: None,
        }
    }

    pub fn append(path: &[&str], value: Value) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Append,
            value: Some(value),
            previous_value: None,
        }
    }

    pub fn remove(path: &[&str], value: Value) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            op: DiffOpKind::Remove,
            value: Some(value),
            previous_value: None,
        }
    }

    fn path_display(&self) -> String {
        self.path.join(".")
    }
}

/// The ordered operation set transforming one snapshot version into the
/// next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    pub from_version: u64,
    pub to_version: u64,
    pub operations: Vec<DiffOp>,
    pub event_id: Option<String>,
    pub checksum: String,
}

impl StateDiff {
    pub fn new(
        from_version: u64,
        to_version: u64,
        operations: Vec<DiffOp>,
        event_id: Option<String>,
    ) -> Self {
        let checksum = diff_checksum(from_version, to_version, &operations);
        Self {
            from_version,
            to_version,
            operations,
            event_id,
            checksum,
        }
    }
}

pub fn diff_checksum(from_version: u64, to_version: u64, operations: &[DiffOp]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DIFF_DOMAIN);
    hasher.update(from_version.to_be_bytes());
    hasher.update(to_version.to_be_bytes());
    let ops = serde_json::to_string(operations).expect("diff ops serialize");
    hasher.update(ops.as_bytes());
    hex::encode(hasher.finalize())
}

/// Apply operations in order to a state tree.
///
/// `Set` creates missing intermediate objects; every other operation
/// requires the full path to exist. `Increment`/`Decrement` mutate integer
/// fields; `Append`/`Remove` work on sequence fields.
pub fn apply_operations(state: &mut Value, operations: &[DiffOp]) -> Result<(), DiffError> {
    for op in operations {
        apply_one(state, op)?;
    }
    Ok(())
}

fn apply_one(state: &mut Value, op: &DiffOp) -> Result<(), DiffError> {
    let Some((leaf, parents)) = op.path.split_last() else {
        return Err(DiffError::PathNotFound {
            path: String::new(),
        });
    };

    let create_missing = op.op == DiffOpKind::Set;
    let mut node = state;
    for key in parents {
        let obj = node
            .as_object_mut()
            .ok_or_else(|| DiffError::TypeMismatch {
                path: op.path_display(),
                expected: "object",
                found: "non-object",
            })?;
        if create_missing && !obj.contains_key(key) {
            obj.insert(key.clone(), Value::Object(serde_json::Map::new()));
        }
        node = obj.get_mut(key).ok_or_else(|| DiffError::PathNotFound {
            path: op.path_display(),
        })?;
    }

    let obj = node
        .as_object_mut()
        .ok_or_else(|| DiffError::TypeMismatch {
            path: op.path_display(),
            expected: "object",
            found: "non-object",
        })?;

    match op.op {
        DiffOpKind::Set => {
            let value = op.value.clone().unwrap_or(Value::Null);
            obj.insert(leaf.clone(), value);
        }
        DiffOpKind::Delete => {
            obj.remove(leaf);
        }
        DiffOpKind::Increment | DiffOpKind::Decrement => {
            let by = op
                .value
                .as_ref()
                .and_then(Value::as_u64)
                .ok_or_else(|| DiffError::TypeMismatch {
                    path: op.path_display(),
                    expected: "unsigned integer amount",
                    found: "other",
                })?;
            let slot = obj.get_mut(leaf).ok_or_else(|| DiffError::PathNotFound {
                path: op.path_display(),
            })?;
            let current = slot.as_u64().ok_or_else(|| DiffError::TypeMismatch {
                path: op.path_display(),
                expected: "unsigned integer field",
                found: "other",
            })?;
            let next = if op.op == DiffOpKind::Increment {
                current.checked_add(by)
            } else {
                current.checked_sub(by)
            }
            .ok_or_else(|| DiffError::NegativeResult {
                path: op.path_display(),
            })?;
            *slot = Value::from(next);
        }
        DiffOpKind::Append => {
            let slot = obj.get_mut(leaf).ok_or_else(|| DiffError::PathNotFound {
                path: op.path_display(),
            })?;
            let arr = slot.as_array_mut().ok_or_else(|| DiffError::TypeMismatch {
                path: op.path_display(),
                expected: "array",
                found: "other",
            })?;
            arr.push(op.value.clone().unwrap_or(Value::Null));
        }
        DiffOpKind::Remove => {
            let slot = obj.get_mut(leaf).ok_or_else(|| DiffError::PathNotFound {
                path: op.path_display(),
            })?;
            let arr = slot.as_array_mut().ok_or_else(|| DiffError::TypeMismatch {
                path: op.path_display(),
                expected: "array",
                found: "other",
            })?;
            let needle = op.value.as_ref().unwrap_or(&Value::Null);
            if let Some(pos) = arr.iter().position(|v| v == needle) {
                arr.remove(pos);
            }
        }
    }
    Ok(())
}

/// Recursive structural compare, emitting the operations that turn `old`
/// into `new`: `Set` for changed primitives and new keys, `Delete` for
/// removed keys. Key additions and removals inside maps (player joins and
/// leaves included) come out as explicit per-key operations.
pub fn structural_diff(old: &Value, new: &Value) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    walk(&mut Vec::new(), old, new, &mut ops);
    ops
}

fn walk(path: &mut Vec<String>, old: &Value, new: &Value, ops: &mut Vec<DiffOp>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                path.push(key.clone());
                match new_map.get(key) {
                    Some(new_value) => walk(path, old_value, new_value, ops),
                    None => ops.push(DiffOp {
                        path: path.clone(),
                        op: DiffOpKind::Delete,
                        value: None,
                        previous_value: Some(old_value.clone()),
                    }),
                }
                path.pop();
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    path.push(key.clone());
                    ops.push(DiffOp {
                        path: path.clone(),
                        op: DiffOpKind::Set,
                        value: Some(new_value.clone()),
                        previous_value: None,
                    });
                    path.pop();
                }
            }
        }
        _ if old == new => {}
        _ => ops.push(DiffOp {
            path: path.clone(),
            op: DiffOpKind::Set,
            value: Some(new.clone()),
            previous_value: Some(old.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_missing_intermediate_objects() {
        let mut state = json!({});
        apply_operations(&mut state, &[DiffOp::set(&["hand", "pot"], json!(60))]).unwrap();
        assert_eq!(state, json!({"hand": {"pot": 60}}));
    }

    #[test]
    fn increment_and_decrement_are_integer_only() {
        let mut state = json!({"players": {"alice": {"stack": 500}}});
        apply_operations(
            &mut state,
            &[
                DiffOp::decrement(&["players", "alice", "stack"], 20),
                DiffOp::increment(&["players", "alice", "stack"], 5),
            ],
        )
        .unwrap();
        assert_eq!(state["players"]["alice"]["stack"], 485);

        let err = apply_operations(
            &mut state,
            &[DiffOp::decrement(&["players", "alice", "stack"], 1000)],
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::NegativeResult { .. }));
    }

    #[test]
    fn append_and_remove_manage_sequences() {
        let mut state = json!({"hand": {"community": []}});
        apply_operations(
            &mut state,
            &[
                DiffOp::append(&["hand", "community"], json!("9s")),
                DiffOp::append(&["hand", "community"], json!("7s")),
                DiffOp::remove(&["hand", "community"], json!("9s")),
            ],
        )
        .unwrap();
        assert_eq!(state["hand"]["community"], json!(["7s"]));
    }

    #[test]
    fn missing_paths_are_typed_errors() {
        let mut state = json!({"a": 1});
        let err =
            apply_operations(&mut state, &[DiffOp::increment(&["b"], 1)]).unwrap_err();
        assert_eq!(err, DiffError::PathNotFound { path: "b".into() });
    }

    #[test]
    fn structural_diff_round_trips_through_apply() {
        let old = json!({
            "table": {"name": "main", "sb": 5},
            "players": {"alice": {"stack": 500}, "bob": {"stack": 300}},
            "hand": {"pot": 0, "community": []}
        });
        let new = json!({
            "table": {"name": "main", "sb": 5},
            "players": {"alice": {"stack": 480}, "carol": {"stack": 200}},
            "hand": {"pot": 20, "community": ["9s"]}
        });
        let ops = structural_diff(&old, &new);
        let mut rebuilt = old.clone();
        apply_operations(&mut rebuilt, &ops).unwrap();
        assert_eq!(rebuilt, new);

        // Player joins and leaves appear as explicit per-key operations.
        assert!(ops.iter().any(|op| op.op == DiffOpKind::Delete
            && op.path == vec!["players".to_string(), "bob".to_string()]));
        assert!(ops.iter().any(|op| op.op == DiffOpKind::Set
            && op.path == vec!["players".to_string(), "carol".to_string()]));
    }

    #[test]
    fn diff_checksum_covers_versions_and_operations() {
        let ops = vec![DiffOp::set(&["hand", "pot"], json!(60))];
        let a = diff_checksum(1, 2, &ops);
        let b = diff_checksum(1, 2, &ops);
        let c = diff_checksum(2, 3, &ops);
        let d = diff_checksum(1, 2, &[DiffOp::set(&["hand", "pot"], json!(61))]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn identical_trees_diff_to_nothing() {
        let v = json!({"players": {"alice": {"stack": 1}}});
        assert!(structural_diff(&v, &v).is_empty());
    }
}
