use super::types::{
    CollectionDefinition, DevOptions, FieldDefinition, FieldEntry, Manifest, SourceSpec,
};
use crate::error::{PressDbError, Result};
use serde::Deserialize;
use std::path::Path;

/// Parse a content.yaml manifest file into a Manifest.
///
/// The manifest root becomes the directory containing the file, so relative
/// collection sources resolve next to it.
pub fn parse_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let root = std::fs::canonicalize(root)?;
    parse_manifest_str(&content, root.as_path())
}

/// Serde shape of the manifest document. Collections are kept as a raw
/// mapping so declaration order survives; `HashMap` would destroy the
/// ordering the dump format depends on.
#[derive(Deserialize)]
struct ManifestDoc {
    #[serde(default)]
    collections: serde_yaml::Mapping,
    #[serde(default)]
    dev: Option<DevOptions>,
}

#[derive(Deserialize)]
struct CollectionDoc {
    #[serde(rename = "type")]
    kind: super::types::CollectionType,
    #[serde(default)]
    source: Option<SourceSpec>,
    #[serde(default)]
    fields: serde_yaml::Mapping,
}

/// Parse a manifest YAML string against an explicit root directory.
pub fn parse_manifest_str(content: &str, root: &Path) -> Result<Manifest> {
    let doc: ManifestDoc = serde_yaml::from_str(content)?;

    let mut collections = Vec::with_capacity(doc.collections.len());
    for (key, value) in &doc.collections {
        let name = key
            .as_str()
            .ok_or_else(|| {
                PressDbError::Config(format!("Collection name must be a string, got: {key:?}"))
            })?
            .to_string();

        let raw: CollectionDoc = serde_yaml::from_value(value.clone())?;

        let mut fields = Vec::with_capacity(raw.fields.len());
        for (field_key, field_value) in &raw.fields {
            let field_name = field_key
                .as_str()
                .ok_or_else(|| {
                    PressDbError::Config(format!(
                        "Field name in collection '{name}' must be a string, got: {field_key:?}"
                    ))
                })?
                .to_string();
            let definition: FieldDefinition = serde_yaml::from_value(field_value.clone())
                .map_err(|e| {
                    PressDbError::Config(format!(
                        "Invalid field '{field_name}' in collection '{name}': {e}"
                    ))
                })?;
            fields.push(FieldEntry {
                name: field_name,
                definition,
            });
        }

        collections.push((
            name,
            CollectionDefinition {
                kind: raw.kind,
                source: raw.source.map(SourceSpec::into_source),
                fields,
            },
        ));
    }

    Ok(Manifest {
        root: root.to_path_buf(),
        collections,
        dev: doc.dev.unwrap_or_default(),
    })
}
