use super::types::{
    CollectionDefinition, CollectionType, FieldDefinition, FieldType, GeneratedFields, Manifest,
    ResolvedCollection, ResolvedField, ResolvedSource, SqlType,
};
use crate::error::{PressDbError, Result};
use heck::ToPascalCase;

/// Reserved collection holding exactly one row with the integrity version.
pub const INFO_COLLECTION: &str = "_info";

pub const FIELD_CONTENT_ID: &str = "contentId";
pub const FIELD_STEM: &str = "stem";
pub const FIELD_EXTENSION: &str = "extension";
pub const FIELD_META: &str = "meta";
pub const FIELD_PATH: &str = "path";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_SEO: &str = "seo";
pub const FIELD_BODY: &str = "body";
pub const FIELD_NAVIGATION: &str = "navigation";
pub const FIELD_RAW_BODY: &str = "rawbody";

/// Fields that are always synthesized and may never be declared.
const RESERVED_FIELDS: &[&str] = &[FIELD_CONTENT_ID, FIELD_STEM, FIELD_EXTENSION, FIELD_META];
/// Additionally synthesized (and reserved) for page collections.
const RESERVED_PAGE_FIELDS: &[&str] = &[FIELD_PATH, FIELD_BODY];

/// Turn the manifest's collection declarations into the canonical resolved
/// form: extended schema in column order, table DDL, generated-field flags
/// and the JSON-encoded field list. Pure; appends the implicit `_info`
/// collection last.
pub fn resolve_collections(manifest: &Manifest) -> Result<Vec<ResolvedCollection>> {
    let mut resolved = Vec::with_capacity(manifest.collections.len() + 1);
    let mut seen = std::collections::HashSet::new();

    for (name, definition) in &manifest.collections {
        if name == INFO_COLLECTION {
            return Err(PressDbError::Schema(format!(
                "Collection name '{INFO_COLLECTION}' is reserved"
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(PressDbError::Schema(format!(
                "Duplicate collection name '{name}'"
            )));
        }
        resolved.push(resolve_collection(manifest, name, definition)?);
    }

    resolved.push(info_collection());
    Ok(resolved)
}

fn resolve_collection(
    manifest: &Manifest,
    name: &str,
    definition: &CollectionDefinition,
) -> Result<ResolvedCollection> {
    for entry in &definition.fields {
        let reserved = RESERVED_FIELDS.contains(&entry.name.as_str())
            || (definition.kind == CollectionType::Page
                && RESERVED_PAGE_FIELDS.contains(&entry.name.as_str()));
        if reserved {
            return Err(PressDbError::Schema(format!(
                "Field '{}' in collection '{name}' collides with a generated field",
                entry.name
            )));
        }
    }

    let mut fields = Vec::new();
    fields.push(generated_field(FIELD_CONTENT_ID, FieldType::String, true, false));

    let mut generated = GeneratedFields::default();
    if definition.kind == CollectionType::Page {
        generated.path = true;
        generated.body = true;
        // Default page fields; a user declaration of the same name takes
        // over that column slot. Fields the parser always fills are
        // required; `description`, `body` and `navigation` may stay null.
        for (slot, field_type, required, json) in [
            (FIELD_PATH, FieldType::String, true, false),
            (FIELD_TITLE, FieldType::String, true, false),
            (FIELD_DESCRIPTION, FieldType::String, false, false),
            (FIELD_SEO, FieldType::Object, true, true),
            (FIELD_BODY, FieldType::Object, false, true),
            (FIELD_NAVIGATION, FieldType::Object, false, true),
        ] {
            match definition.fields.iter().find(|f| f.name == slot) {
                Some(entry) => fields.push(resolve_field(name, &entry.name, &entry.definition)?),
                None => fields.push(generated_field(slot, field_type, required, json)),
            }
        }
    }

    for entry in &definition.fields {
        if fields.iter().any(|f| f.name == entry.name) {
            continue;
        }
        fields.push(resolve_field(name, &entry.name, &entry.definition)?);
    }

    if definition.fields.iter().any(|f| f.name == FIELD_RAW_BODY) {
        generated.raw = true;
    }

    fields.push(generated_field(FIELD_STEM, FieldType::String, true, false));
    fields.push(generated_field(FIELD_EXTENSION, FieldType::String, true, false));
    fields.push(generated_field(FIELD_META, FieldType::Object, true, true));

    let table_name = table_name(name);
    let table_definition = build_table_definition(&table_name, &fields, FIELD_CONTENT_ID);
    let json_fields = fields
        .iter()
        .filter(|f| f.json)
        .map(|f| f.name.clone())
        .collect();

    Ok(ResolvedCollection {
        name: name.to_string(),
        pascal_name: name.to_pascal_case(),
        kind: definition.kind,
        source: definition
            .source
            .as_ref()
            .map(|source| resolve_source(manifest, source)),
        fields,
        table_name,
        table_definition,
        generated_fields: generated,
        json_fields,
    })
}

fn resolve_source(
    manifest: &Manifest,
    source: &super::types::CollectionSource,
) -> ResolvedSource {
    let cwd = match &source.cwd {
        Some(cwd) => manifest.root.join(cwd),
        None => manifest.root.clone(),
    };
    ResolvedSource {
        repository: source.repository.clone(),
        cwd,
        path: source.path.clone(),
        prefix: source.prefix.clone(),
        ignore: source.ignore.clone(),
    }
}

fn resolve_field(
    collection: &str,
    name: &str,
    definition: &FieldDefinition,
) -> Result<ResolvedField> {
    let json = matches!(definition.field_type, FieldType::List | FieldType::Object);
    let default = match &definition.default {
        Some(value) => Some(serde_json::to_value(value).map_err(|e| {
            PressDbError::Schema(format!(
                "Invalid default for field '{name}' in collection '{collection}': {e}"
            ))
        })?),
        None => None,
    };
    Ok(ResolvedField {
        name: name.to_string(),
        sql_type: sql_type(&definition.field_type),
        field_type: definition.field_type.clone(),
        required: definition.required,
        enum_values: definition.enum_values.clone(),
        default,
        items: definition.items.clone(),
        json,
    })
}

fn generated_field(name: &str, field_type: FieldType, required: bool, json: bool) -> ResolvedField {
    ResolvedField {
        name: name.to_string(),
        sql_type: sql_type(&field_type),
        field_type,
        required,
        enum_values: None,
        default: None,
        items: None,
        json,
    }
}

fn sql_type(field_type: &FieldType) -> SqlType {
    match field_type {
        FieldType::Number => SqlType::Real,
        FieldType::Boolean => SqlType::Integer,
        FieldType::String
        | FieldType::Date
        | FieldType::Datetime
        | FieldType::List
        | FieldType::Object => SqlType::Text,
    }
}

pub fn table_name(collection: &str) -> String {
    format!("content_{collection}")
}

fn build_table_definition(table: &str, fields: &[ResolvedField], primary_key: &str) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| {
            if f.name == primary_key {
                format!("\"{}\" {} PRIMARY KEY", f.name, f.sql_type.as_sql())
            } else {
                format!("\"{}\" {}", f.name, f.sql_type.as_sql())
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        table,
        columns.join(", ")
    )
}

/// The implicit `_info` collection: one row recording the integrity version.
fn info_collection() -> ResolvedCollection {
    let fields = vec![
        generated_field("id", FieldType::String, true, false),
        generated_field("version", FieldType::String, true, false),
    ];
    let table = table_name(INFO_COLLECTION);
    let table_definition = build_table_definition(&table, &fields, "id");
    ResolvedCollection {
        name: INFO_COLLECTION.to_string(),
        pascal_name: "Info".to_string(),
        kind: CollectionType::Data,
        source: None,
        fields,
        table_name: table,
        table_definition,
        generated_fields: GeneratedFields::default(),
        json_fields: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parser::parse_manifest_str;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn manifest(content: &str) -> Manifest {
        parse_manifest_str(content, Path::new("/data")).unwrap()
    }

    const TWO_COLLECTIONS: &str = r#"
collections:
  posts:
    type: page
    source: content/posts
    fields:
      title: { type: string, required: true }
      tags: { type: list, items: string }
  authors:
    type: data
    source: content/authors
    fields:
      name: { type: string, required: true }
"#;

    #[test]
    fn one_resolved_collection_per_declaration_plus_info() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let names: Vec<_> = resolved.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["posts", "authors", "_info"]);
    }

    #[test]
    fn table_names_are_pairwise_distinct() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let mut tables: Vec<_> = resolved.iter().map(|c| c.table_name.clone()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), resolved.len());
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let b = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let ddl_a: Vec<_> = a.iter().map(|c| c.table_definition.clone()).collect();
        let ddl_b: Vec<_> = b.iter().map(|c| c.table_definition.clone()).collect();
        assert_eq!(ddl_a, ddl_b);
    }

    #[test]
    fn nested_fields_are_json_scalars_are_not() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let posts = &resolved[0];
        assert!(posts.json_fields.contains(&"tags".to_string()));
        assert!(!posts.json_fields.contains(&"title".to_string()));
    }

    #[test]
    fn page_collections_gain_route_fields() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let posts = &resolved[0];
        for name in ["contentId", "path", "title", "body", "stem", "extension", "meta"] {
            assert!(posts.field(name).is_some(), "missing field {name}");
        }
        assert!(posts.generated_fields.path);
        assert!(posts.generated_fields.body);

        let authors = &resolved[1];
        assert!(authors.field("path").is_none());
        assert!(authors.field("body").is_none());
        assert!(!authors.generated_fields.path);
    }

    #[test]
    fn column_order_is_stable() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let posts = &resolved[0];
        let order: Vec<_> = posts.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "contentId",
                "path",
                "title",
                "description",
                "seo",
                "body",
                "navigation",
                "tags",
                "stem",
                "extension",
                "meta"
            ]
        );
    }

    #[test]
    fn duplicate_collection_names_rejected() {
        let mut m = manifest(TWO_COLLECTIONS);
        let dup = m.collections[0].clone();
        m.collections.push(dup);
        let err = resolve_collections(&m).unwrap_err();
        assert!(matches!(err, PressDbError::Schema(_)));
    }

    #[test]
    fn reserved_collection_name_rejected() {
        let bad = r#"
collections:
  _info:
    type: data
    fields:
      id: { type: string }
"#;
        let err = resolve_collections(&manifest(bad)).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn generated_field_collision_rejected() {
        let bad = r#"
collections:
  posts:
    type: page
    fields:
      body: { type: string }
"#;
        let err = resolve_collections(&manifest(bad)).unwrap_err();
        assert!(err.to_string().contains("generated field"));
    }

    #[test]
    fn user_title_takes_over_the_default_slot() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let posts = &resolved[0];
        let title = posts.field("title").unwrap();
        assert!(title.required);
        // Only one title column.
        assert_eq!(posts.fields.iter().filter(|f| f.name == "title").count(), 1);
    }

    #[test]
    fn rawbody_declaration_sets_generated_raw_flag() {
        let m = r#"
collections:
  posts:
    type: page
    source: content/posts
    fields:
      rawbody: { type: string }
"#;
        let resolved = resolve_collections(&manifest(m)).unwrap();
        assert!(resolved[0].generated_fields.raw);
    }

    #[test]
    fn info_table_definition_uses_id_primary_key() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let info = resolved.last().unwrap();
        assert_eq!(info.table_name, "content__info");
        assert_eq!(
            info.table_definition,
            "CREATE TABLE IF NOT EXISTS content__info (\"id\" TEXT PRIMARY KEY, \"version\" TEXT);"
        );
    }

    #[test]
    fn source_cwd_is_absolutized_against_manifest_root() {
        let resolved = resolve_collections(&manifest(TWO_COLLECTIONS)).unwrap();
        let source = resolved[0].source.as_ref().unwrap();
        assert_eq!(source.cwd, Path::new("/data"));
        assert_eq!(source.path, "content/posts");
    }
}
