//! Array initialization guard.
//!
//! An `add` at `/spec/volumes/-` fails when the Pod has no `volumes` array at all. Before
//! the patch leaves the webhook, every watched array that is absent on the original object
//! but targeted by some operation gets an `add` of an empty array at the front of the list.

use serde_json::Value;
use tracing::debug;

use super::{ArrayField, PatchOp};

/// Whether `field` is present (and not null) on the serialized Pod.
fn has_array(object: &Value, field: ArrayField) -> bool {
    object
        .get("spec")
        .and_then(|spec| spec.get(field.field_name()))
        .is_some_and(|v| !v.is_null())
}

/// Prepend empty-array initializers for arrays missing from `object`.
///
/// Fields are checked in [`ArrayField::GUARD_ORDER`] and each initializer is inserted at
/// position 0, so with all three firing the result starts with volumes, then containers,
/// then initContainers.
pub fn guard_missing_arrays(ops: &mut Vec<PatchOp>, object: &Value) {
    for field in ArrayField::GUARD_ORDER {
        if has_array(object, field) {
            continue;
        }
        let prefix = field.element_prefix();
        if ops.iter().any(|op| op.path_starts_with(&prefix)) {
            debug!(field = field.field_name(), "Initializing missing pod spec array");
            ops.insert(0, PatchOp::add(field.array_path(), Value::Array(Vec::new())));
        }
    }
}
