//! JSON Patch model.
//!
//! [`PatchOp`] is a single RFC 6902 operation as it appears in mutation configs and in the
//! admission response. [`PatchBase`] is the `op`/`index` shorthand carried by typed
//! container and volume insertions, expanded into a full [`PatchOp`] against one of the
//! Pod spec arrays in [`ArrayField`].

mod guard;

pub use guard::guard_missing_arrays;

use std::fmt;

use jsonptr::PointerBuf;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// JSON Patch operation kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    #[default]
    Add,
    Remove,
    Replace,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Remove => "remove",
            Op::Replace => "replace",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Op::Add),
            "remove" => Ok(Op::Remove),
            "replace" => Ok(Op::Replace),
            other => Err(format!("unsupported patch op '{}'", other)),
        }
    }
}

/// One JSON Patch operation.
///
/// `value` is `None` for `remove`. Sequences of `PatchOp` are applied in order by the
/// API server, so every producer in this crate preserves the order it builds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: Op,
    pub path: PointerBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    /// `add` operation.
    pub fn add(path: PointerBuf, value: Value) -> Self {
        Self {
            op: Op::Add,
            path,
            value: Some(value),
        }
    }

    /// `remove` operation.
    pub fn remove(path: PointerBuf) -> Self {
        Self {
            op: Op::Remove,
            path,
            value: None,
        }
    }

    /// `replace` operation.
    pub fn replace(path: PointerBuf, value: Value) -> Self {
        Self {
            op: Op::Replace,
            path,
            value: Some(value),
        }
    }

    /// Whether this operation targets `prefix` or anything below it.
    pub fn path_starts_with(&self, prefix: &str) -> bool {
        self.path.as_str().starts_with(prefix)
    }
}

impl From<PatchOp> for json_patch::PatchOperation {
    fn from(op: PatchOp) -> Self {
        use json_patch::{AddOperation, RemoveOperation, ReplaceOperation};

        let PatchOp { op, path, value } = op;
        match op {
            Op::Add => json_patch::PatchOperation::Add(AddOperation {
                path,
                value: value.unwrap_or(Value::Null),
            }),
            Op::Remove => json_patch::PatchOperation::Remove(RemoveOperation { path }),
            Op::Replace => json_patch::PatchOperation::Replace(ReplaceOperation {
                path,
                value: value.unwrap_or(Value::Null),
            }),
        }
    }
}

/// Convert an ordered operation list into the patch type carried by `AdmissionResponse`.
pub fn to_json_patch(ops: Vec<PatchOp>) -> json_patch::Patch {
    json_patch::Patch(ops.into_iter().map(Into::into).collect())
}

/// Pod spec arrays that typed insertions target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayField {
    InitContainers,
    Containers,
    Volumes,
}

impl ArrayField {
    /// Fixed order in which the missing-array guard inspects the fields.
    pub const GUARD_ORDER: [ArrayField; 3] = [
        ArrayField::InitContainers,
        ArrayField::Containers,
        ArrayField::Volumes,
    ];

    /// Field name inside `PodSpec`.
    pub fn field_name(&self) -> &'static str {
        match self {
            ArrayField::InitContainers => "initContainers",
            ArrayField::Containers => "containers",
            ArrayField::Volumes => "volumes",
        }
    }

    /// Pointer to the array itself, e.g. `/spec/volumes`.
    pub fn array_path(&self) -> PointerBuf {
        PointerBuf::from_tokens(["spec", self.field_name()])
    }

    /// Prefix shared by all element paths, e.g. `/spec/volumes/`.
    pub fn element_prefix(&self) -> String {
        format!("/spec/{}/", self.field_name())
    }

    /// Pointer to one element (or the append position) of the array.
    pub fn element_path(&self, index: &PatchIndex) -> PointerBuf {
        let index = index.to_string();
        PointerBuf::from_tokens(["spec", self.field_name(), index.as_str()])
    }
}

/// Array position used by a [`PatchBase`]: an explicit index or `-` (append).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PatchIndex {
    #[default]
    Append,
    At(usize),
}

impl fmt::Display for PatchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchIndex::Append => f.write_str("-"),
            PatchIndex::At(i) => write!(f, "{}", i),
        }
    }
}

impl std::str::FromStr for PatchIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "-" => Ok(PatchIndex::Append),
            digits if digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse::<usize>()
                .map(PatchIndex::At)
                .map_err(|_| format!("invalid array index '{}'", s)),
            _ => Err(format!("invalid array index '{}'", s)),
        }
    }
}

impl Serialize for PatchIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl Visitor<'_> for IndexVisitor {
            type Value = PatchIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array index or \"-\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PatchIndex, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PatchIndex, E> {
                usize::try_from(v).map(PatchIndex::At).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PatchIndex, E> {
                usize::try_from(v).map(PatchIndex::At).map_err(E::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<PatchIndex, E> {
                Ok(PatchIndex::Append)
            }

            fn visit_none<E: de::Error>(self) -> Result<PatchIndex, E> {
                Ok(PatchIndex::Append)
            }
        }

        deserializer.deserialize_any(IndexVisitor)
    }
}

/// Defaulting descriptor carried inline by typed insertions.
///
/// A missing or empty `op` means `add`; a missing or empty `index` means append.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBase {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_op",
        skip_serializing_if = "Option::is_none"
    )]
    pub op: Option<Op>,
    #[serde(default)]
    pub index: PatchIndex,
}

impl PatchBase {
    pub fn new(op: Op, index: PatchIndex) -> Self {
        Self {
            op: Some(op),
            index,
        }
    }

    /// Effective operation after defaulting.
    pub fn op(&self) -> Op {
        self.op.unwrap_or_default()
    }

    /// Expand into a single operation against `field`.
    ///
    /// `remove` never carries a value, whatever the payload. Fails only when the payload
    /// cannot be represented as JSON.
    pub fn expand<T: Serialize>(
        &self,
        field: ArrayField,
        payload: &T,
    ) -> Result<PatchOp, serde_json::Error> {
        let op = self.op();
        let value = match op {
            Op::Remove => None,
            Op::Add | Op::Replace => Some(serde_json::to_value(payload)?),
        };
        Ok(PatchOp {
            op,
            path: field.element_path(&self.index),
            value,
        })
    }
}

fn deserialize_optional_op<'de, D>(deserializer: D) -> Result<Option<Op>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(de::Error::custom),
    }
}
