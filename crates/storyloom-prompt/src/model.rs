/*
 * model.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Authored template types.
//!
//! These are the JSON-facing structures a template author (or the visual
//! template builder) produces. They are validated and lowered into a
//! [`CompiledTemplate`](crate::CompiledTemplate) before use; nothing here is
//! executed directly.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Chat role of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Role> {
        match name.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete authored template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: String,
    /// Task kind this template serves (e.g. `turn_generation`, `chapter_summary`).
    pub task: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ceiling for the whole template; slot budgets must fit under it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    pub layout: Vec<LayoutNode>,
    pub slots: SlotMap,
}

fn default_version() -> u32 {
    1
}

/// Token limits attached to a template or slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    /// Ceiling on tokens this scope may spend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tokens reserved for this slot before any slot runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
}

/// Named, independently budgeted content block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    /// Higher priorities run first and claim budget first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default)]
    pub plan: Vec<PlanNode>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub omit_if_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<MessageBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<MessageBlock>,
}

/// Slots in declaration order.
///
/// Backed by a list rather than a map so that duplicate names in the source
/// JSON survive deserialization and can be rejected by validation, and so that
/// declaration order is available to break priority ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotMap(Vec<(String, SlotSpec)>);

impl SlotMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a slot. Duplicates are kept; validation reports them.
    pub fn insert(&mut self, name: impl Into<String>, spec: SlotSpec) {
        self.0.push((name.into(), spec));
    }

    /// First slot with this name.
    pub fn get(&self, name: &str) -> Option<&SlotSpec> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotSpec)> {
        self.0.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, SlotSpec)> for SlotMap {
    fn from_iter<I: IntoIterator<Item = (N, SlotSpec)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, s)| (n.into(), s)).collect())
    }
}

impl Serialize for SlotMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, spec) in &self.0 {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SlotMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SlotMapVisitor;

        impl<'de> Visitor<'de> for SlotMapVisitor {
            type Value = SlotMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of slot names to slot specs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SlotMap, A::Error> {
                let mut slots = SlotMap::new();
                while let Some((name, spec)) = access.next_entry::<String, SlotSpec>()? {
                    slots.insert(name, spec);
                }
                Ok(slots)
            }
        }

        deserializer.deserialize_map(SlotMapVisitor)
    }
}

impl JsonSchema for SlotMap {
    fn schema_name() -> String {
        <BTreeMap<String, SlotSpec>>::schema_name()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        <BTreeMap<String, SlotSpec>>::json_schema(generator)
    }

    fn is_referenceable() -> bool {
        false
    }
}

/// A fixed message: slot header/footer or a literal layout block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageBlock {
    pub role: Role,
    /// Leaf template string.
    pub content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefix: bool,
}

/// Ordered placement unit of the final message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayoutNode {
    /// Placeholder for a slot's executed output.
    Slot { name: String },
    /// Literal message block.
    Message(MessageBlock),
    /// Position where external injections for this anchor are spliced.
    Anchor { anchor: GlobalAnchor },
}

/// Named layout positions for externally supplied content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GlobalAnchor {
    /// Always first, needs no layout node.
    Top,
    BeforeChar,
    AfterChar,
    BeforeHistory,
    AfterHistory,
    /// Always last, needs no layout node.
    Bottom,
}

/// Executable instruction inside a slot plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanNode {
    Message(MessageNode),
    ForEach(ForEachNode),
    If(IfNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageNode {
    pub role: Role,
    pub content: String,
    /// Resolves to a role name (overriding `role`) or to an author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DataRef>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForEachNode {
    pub source: DataRef,
    #[serde(default)]
    pub map: Vec<PlanNode>,
    /// Keep at most this many items, taken from the freshest end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub fill_dir: FillDir,
}

/// How per-item output is placed into the loop's buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FillDir {
    #[default]
    Append,
    /// Insert at the front, turning a newest-first source into chronological output.
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IfNode {
    pub when: ConditionRef,
    #[serde(default)]
    pub then: Vec<PlanNode>,
    #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
    pub otherwise: Vec<PlanNode>,
}

/// Structured predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConditionRef {
    #[serde(rename = "ref")]
    pub reference: DataRef,
    #[serde(rename = "type")]
    pub kind: ConditionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ConditionType {
    Eq,
    Neq,
    NonEmpty,
    Empty,
    Exists,
    Contains,
}

/// Pointer to a value: a source name, an optional path into the resolved
/// value, and arguments forwarded to the source resolver.
///
/// Authors may write the shorthand string form `"$item.name"`, which splits
/// into source `$item` and path `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DataRefRepr", into = "DataRefRepr")]
pub struct DataRef {
    pub source: String,
    pub path: Option<String>,
    pub args: Map<String, Value>,
}

impl DataRef {
    /// A reference to a whole source with no path or arguments.
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            source: name.into(),
            path: None,
            args: Map::new(),
        }
    }

    /// Parse the shorthand form: everything before the first `.` or `[` is
    /// the source name, the rest is the path.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.find(['.', '[']) {
            Some(pos) => {
                let rest = &text[pos..];
                let path = rest.strip_prefix('.').unwrap_or(rest);
                Self {
                    source: text[..pos].to_string(),
                    path: (!path.is_empty()).then(|| path.to_string()),
                    args: Map::new(),
                }
            }
            None => Self::source(text),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// True for `$item`, `$index`, `$parent`, `$globals`, `$ctx`.
    pub fn is_reserved(&self) -> bool {
        crate::registry::is_reserved_source(&self.source)
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        match &self.path {
            Some(path) if path.starts_with('[') => f.write_str(path),
            Some(path) => write!(f, ".{}", path),
            None => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
enum DataRefRepr {
    Shorthand(String),
    Full {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        args: Map<String, Value>,
    },
}

impl From<DataRefRepr> for DataRef {
    fn from(repr: DataRefRepr) -> Self {
        match repr {
            DataRefRepr::Shorthand(text) => DataRef::parse(&text),
            DataRefRepr::Full { source, path, args } => DataRef { source, path, args },
        }
    }
}

impl From<DataRef> for DataRefRepr {
    fn from(data_ref: DataRef) -> Self {
        if data_ref.args.is_empty() {
            DataRefRepr::Shorthand(data_ref.to_string())
        } else {
            DataRefRepr::Full {
                source: data_ref.source,
                path: data_ref.path,
                args: data_ref.args,
            }
        }
    }
}

impl JsonSchema for DataRef {
    fn schema_name() -> String {
        "DataRef".to_string()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        DataRefRepr::json_schema(generator)
    }
}

/// One message of the rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionMessage {
    pub role: Role,
    pub content: String,
    /// Author name, when a message's `from` resolved to something other than a role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefix: bool,
}

impl ChatCompletionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            prefix: false,
        }
    }
}
