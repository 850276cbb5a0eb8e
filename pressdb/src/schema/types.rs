use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a collection's documents are turned into records.
///
/// `page` collections describe routable documents (markdown pages with a
/// rendered body and a route path); `data` collections are plain structured
/// records with no route semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Page,
    Data,
}

/// Where a collection's raw documents live.
///
/// `path` is a directory relative to `cwd` (itself relative to the manifest
/// root unless absolute). `repository` switches the mount to a remote
/// tarball snapshot; an `http(s)://` path switches it to an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSource {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    pub path: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl CollectionSource {
    /// Shorthand for a plain local directory source.
    pub fn from_path(path: impl Into<String>) -> Self {
        CollectionSource {
            repository: None,
            cwd: None,
            path: path.into(),
            prefix: None,
            ignore: Vec::new(),
        }
    }
}

/// A source declaration: either a bare path string or the full form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Path(String),
    Full(CollectionSource),
}

impl SourceSpec {
    pub fn into_source(self) -> CollectionSource {
        match self {
            SourceSpec::Path(path) => CollectionSource::from_path(path),
            SourceSpec::Full(source) => source,
        }
    }
}

/// Field type enumeration for declared collection fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
}

/// Item type for lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(String),
    Complex(Box<FieldDefinition>),
}

/// Definition of a single declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub items: Option<ItemType>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            enum_values: None,
            default: None,
            items: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A declared field, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    pub definition: FieldDefinition,
}

/// Definition of a single collection as declared in the manifest.
#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    pub kind: CollectionType,
    pub source: Option<CollectionSource>,
    /// Declared fields in declaration order. Order is load-bearing: it
    /// determines column order in the generated table definition.
    pub fields: Vec<FieldEntry>,
}

/// Development-mode options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevOptions {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".data/content")
}

fn default_database_name() -> String {
    "items.db".to_string()
}

impl Default for DevOptions {
    fn default() -> Self {
        DevOptions {
            data_dir: default_data_dir(),
            database_name: default_database_name(),
        }
    }
}

/// The full parsed manifest: ordered collection declarations plus options.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Directory all relative source paths are resolved against.
    pub root: PathBuf,
    pub collections: Vec<(String, CollectionDefinition)>,
    pub dev: DevOptions,
}

impl Manifest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Manifest {
            root: root.into(),
            collections: Vec::new(),
            dev: DevOptions::default(),
        }
    }

    pub fn collection(
        mut self,
        name: impl Into<String>,
        definition: CollectionDefinition,
    ) -> Self {
        self.collections.push((name.into(), definition));
        self
    }
}

/// SQL column affinity a field maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Real,
    Integer,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Real => "REAL",
            SqlType::Integer => "INTEGER",
        }
    }
}

/// A field of the extended schema, carrying everything the parser and the
/// dump generator need to produce and serialize its column value.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: String,
    pub field_type: FieldType,
    pub sql_type: SqlType,
    pub required: bool,
    pub enum_values: Option<Vec<String>>,
    pub default: Option<serde_json::Value>,
    pub items: Option<ItemType>,
    /// Value is serialized to a compact JSON string before it reaches SQL.
    pub json: bool,
}

/// Which of the synthesized fields this collection actually synthesizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedFields {
    pub raw: bool,
    pub body: bool,
    pub path: bool,
}

/// A resolved collection source: `cwd` has been absolutized against the
/// manifest root and is immutable from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub repository: Option<String>,
    pub cwd: PathBuf,
    pub path: String,
    pub prefix: Option<String>,
    pub ignore: Vec<String>,
}

/// The canonical in-memory description of a collection for the rest of the
/// pipeline.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    pub name: String,
    pub pascal_name: String,
    pub kind: CollectionType,
    pub source: Option<ResolvedSource>,
    /// Extended schema in column order.
    pub fields: Vec<ResolvedField>,
    pub table_name: String,
    pub table_definition: String,
    pub generated_fields: GeneratedFields,
    pub json_fields: Vec<String>,
}

impl ResolvedCollection {
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Collection metadata surfaced to codegen and runtime lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub pascal_name: String,
    pub table_name: String,
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub json_fields: Vec<String>,
}

impl From<&ResolvedCollection> for CollectionInfo {
    fn from(collection: &ResolvedCollection) -> Self {
        CollectionInfo {
            name: collection.name.clone(),
            pascal_name: collection.pascal_name.clone(),
            table_name: collection.table_name.clone(),
            kind: collection.kind,
            json_fields: collection.json_fields.clone(),
        }
    }
}
