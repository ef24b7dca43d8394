use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub fn new_request_id() -> String {
    Ulid::new().to_string()
}

pub fn is_request_id(s: &str) -> bool {
    Ulid::from_string(s).is_ok()
}

/// An id-valued field as the API returns it: either left as a bare id or
/// populated into the referenced record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdRef {
    Raw(String),
    Populated(PopulatedRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulatedRef {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
}

impl IdRef {
    pub fn id(&self) -> &str {
        extract_id(self)
    }
}

impl From<&str> for IdRef {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_string())
    }
}

impl From<String> for IdRef {
    fn from(value: String) -> Self {
        Self::Raw(value)
    }
}

pub fn extract_id(value: &IdRef) -> &str {
    match value {
        IdRef::Raw(id) => id,
        IdRef::Populated(obj) => &obj.id,
    }
}

pub fn normalize_ids<'a, I>(refs: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a IdRef>,
{
    refs.into_iter().map(|r| extract_id(r).to_string()).collect()
}

pub fn contains_id(refs: &[IdRef], id: &str) -> bool {
    refs.iter().any(|r| extract_id(r) == id)
}
