pub mod parser;
pub mod resolver;
pub mod types;

pub use parser::{parse_manifest, parse_manifest_str};
pub use resolver::{resolve_collections, table_name, INFO_COLLECTION};
pub use types::{
    CollectionDefinition, CollectionInfo, CollectionSource, CollectionType, DevOptions,
    FieldDefinition, FieldEntry, FieldType, GeneratedFields, ItemType, Manifest,
    ResolvedCollection, ResolvedField, ResolvedSource, SqlType,
};

use sha2::{Digest, Sha256};

/// Static prefix of the integrity version; bumped on breaking changes to the
/// dump layout.
pub const INTEGRITY_PREFIX: &str = "0.1.0";

/// Compute the integrity version for a set of resolved collections.
///
/// The hash covers the ordered table-name list only, so it changes exactly
/// when the set (or order) of tables changes, never when document content
/// does.
pub fn integrity_version(collections: &[ResolvedCollection]) -> String {
    let joined = collections
        .iter()
        .map(|c| c.table_name.as_str())
        .collect::<Vec<_>>()
        .join("-");
    let digest = Sha256::digest(joined.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{INTEGRITY_PREFIX}-{}", &hex[..10])
}
