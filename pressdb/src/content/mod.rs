pub mod markdown;

use crate::error::{PressDbError, Result};
use crate::schema::{CollectionType, ResolvedCollection};
use crate::storage::Storage;
use crate::validation;
use serde_json::{Map, Value};

/// A schema-validated record for one storage key. Records are never mutated
/// in place; a changed document produces a brand-new record for the same
/// key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecord {
    pub fields: Map<String, Value>,
}

impl ParsedRecord {
    pub fn new() -> Self {
        ParsedRecord::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Fetch and parse one storage key into a validated record. Parse failures
/// carry the offending key; parsing is pure given identical bytes.
pub async fn parse_content(
    storage: &Storage,
    collection: &ResolvedCollection,
    key: &str,
) -> Result<ParsedRecord> {
    let bytes = storage.get_item(key).await?;
    build_record(collection, key, &bytes).map_err(|cause| PressDbError::parse(key, cause))
}

/// Parse raw bytes for a key into a validated record. The parsing strategy
/// is selected from the file extension.
pub fn build_record(
    collection: &ResolvedCollection,
    key: &str,
    bytes: &[u8],
) -> Result<ParsedRecord> {
    let prefix = format!("{}/", collection.name);
    let relative = key.strip_prefix(&prefix).unwrap_or(key);
    let (stem, extension) = split_extension(relative);

    let mut candidate: Map<String, Value>;
    let mut body_value: Option<Value> = None;
    let mut raw_body: Option<String> = None;
    let mut derived_title: Option<String> = None;
    let mut derived_description: Option<String> = None;

    match extension {
        "md" | "markdown" => {
            let text = utf8(bytes)?;
            let (front, body_text) = markdown::split_front_matter(text)?;
            candidate = front_matter_to_map(front)?;
            if collection.kind == CollectionType::Page {
                let body = markdown::render_markdown(body_text);
                derived_title = body.title;
                derived_description = body.description;
                body_value = Some(serde_json::to_value(&body.root)?);
                raw_body = Some(body_text.to_string());
            }
        }
        "yml" | "yaml" => {
            let value: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
            candidate = yaml_to_map(value)?;
        }
        "json" => match serde_json::from_slice(bytes)? {
            Value::Object(map) => candidate = map,
            _ => {
                return Err(PressDbError::Validation(
                    "JSON document must be an object".to_string(),
                ))
            }
        },
        other => {
            if collection.kind == CollectionType::Data {
                return Err(PressDbError::Validation(format!(
                    "Unsupported extension '.{other}'"
                )));
            }
            // Static pass-through for page collections: the raw text is the
            // whole body.
            let text = String::from_utf8_lossy(bytes).into_owned();
            candidate = Map::new();
            body_value = Some(serde_json::json!({
                "type": "root",
                "children": [{ "type": "text", "value": text }],
            }));
            raw_body = Some(text);
        }
    }

    candidate.insert("contentId".to_string(), Value::String(key.to_string()));
    candidate.insert("stem".to_string(), Value::String(stem.to_string()));
    candidate.insert(
        "extension".to_string(),
        Value::String(extension.to_string()),
    );

    if collection.kind == CollectionType::Page {
        let prefix = collection
            .source
            .as_ref()
            .and_then(|s| s.prefix.as_deref());

        if is_absent(candidate.get("path")) {
            candidate.insert(
                "path".to_string(),
                Value::String(route_path(stem, prefix)),
            );
        }
        if is_absent(candidate.get("title")) {
            let fallback = derived_title
                .clone()
                .unwrap_or_else(|| titleize(last_segment(stem)));
            candidate.insert("title".to_string(), Value::String(fallback));
        }
        if is_absent(candidate.get("description")) {
            if let Some(description) = &derived_description {
                candidate.insert(
                    "description".to_string(),
                    Value::String(description.trim().to_string()),
                );
            }
        }

        let mut seo = match candidate.remove("seo") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if !seo.contains_key("title") {
            if let Some(Value::String(title)) = candidate.get("title") {
                seo.insert("title".to_string(), Value::String(title.clone()));
            }
        }
        if !seo.contains_key("description") {
            if let Some(Value::String(description)) = candidate.get("description") {
                seo.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
        }
        candidate.insert("seo".to_string(), Value::Object(seo));

        // Authors write `navigation: false` to opt a page out; normalize the
        // boolean form so the column always holds an object.
        if let Some(Value::Bool(enabled)) = candidate.get("navigation") {
            let enabled = *enabled;
            candidate.insert(
                "navigation".to_string(),
                serde_json::json!({ "enabled": enabled }),
            );
        }

        candidate.insert("body".to_string(), body_value.unwrap_or(Value::Null));
        if collection.generated_fields.raw && is_absent(candidate.get("rawbody")) {
            if let Some(raw) = &raw_body {
                candidate.insert("rawbody".to_string(), Value::String(raw.clone()));
            }
        }
    }

    // Everything the schema does not know about lands in `meta`.
    let mut meta = match candidate.remove("meta") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let unknown: Vec<String> = candidate
        .keys()
        .filter(|name| collection.field(name.as_str()).is_none())
        .cloned()
        .collect();
    for name in unknown {
        if let Some(value) = candidate.remove(&name) {
            meta.insert(name, value);
        }
    }
    candidate.insert("meta".to_string(), Value::Object(meta));

    let mut record = validation::validate_record(collection, candidate)
        .map_err(|errors| PressDbError::Validation(errors.join("; ")))?;

    for name in &collection.json_fields {
        if let Some(value) = record.get_mut(name) {
            if !value.is_null() {
                *value = Value::String(serde_json::to_string(value)?);
            }
        }
    }

    Ok(ParsedRecord { fields: record })
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|_| PressDbError::Validation("Document is not valid UTF-8".to_string()))
}

fn front_matter_to_map(front: Option<serde_yaml::Value>) -> Result<Map<String, Value>> {
    match front {
        None => Ok(Map::new()),
        Some(value) => yaml_to_map(value),
    }
}

fn yaml_to_map(value: serde_yaml::Value) -> Result<Map<String, Value>> {
    match serde_json::to_value(&value)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(PressDbError::Validation(
            "Document metadata must be a mapping".to_string(),
        )),
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn split_extension(relative: &str) -> (&str, &str) {
    let file_name = relative.rsplit('/').next().unwrap_or(relative);
    match file_name.rsplit_once('.') {
        Some((stem_part, extension)) if !stem_part.is_empty() => {
            let stem_len = relative.len() - extension.len() - 1;
            (&relative[..stem_len], extension)
        }
        _ => (relative, ""),
    }
}

fn last_segment(stem: &str) -> &str {
    stem.rsplit('/').next().unwrap_or(stem)
}

/// Derive the route path from a stem: numeric order prefixes stripped,
/// segments slugified, trailing `index` collapsed, source prefix prepended.
fn route_path(stem: &str, prefix: Option<&str>) -> String {
    let mut segments: Vec<String> = stem
        .split('/')
        .map(strip_order_prefix)
        .map(slug::slugify)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.last().map(|s| s == "index").unwrap_or(false) {
        segments.pop();
    }
    let prefix = prefix.unwrap_or("").trim_end_matches('/');
    let path = format!("{prefix}/{}", segments.join("/"));
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `"1.getting-started"` sorts files on disk; the route drops the prefix.
fn strip_order_prefix(segment: &str) -> &str {
    match segment.split_once('.') {
        Some((order, rest))
            if !order.is_empty()
                && !rest.is_empty()
                && order.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => segment,
    }
}

fn titleize(value: &str) -> String {
    value
        .split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_manifest_str, resolve_collections};
    use crate::storage::MemoryDriver;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    const MANIFEST: &str = r#"
collections:
  posts:
    type: page
    source:
      path: content/posts
    fields:
      title: { type: string, required: true }
      tags: { type: list, items: string }
  settings:
    type: data
    source: content/settings
    fields:
      name: { type: string, required: true }
      limit: { type: number }
"#;

    fn collections() -> Vec<ResolvedCollection> {
        let manifest = parse_manifest_str(MANIFEST, Path::new("/data")).unwrap();
        resolve_collections(&manifest).unwrap()
    }

    fn posts() -> ResolvedCollection {
        collections().remove(0)
    }

    fn settings() -> ResolvedCollection {
        collections().remove(1)
    }

    #[test]
    fn markdown_page_with_front_matter() {
        let record = build_record(
            &posts(),
            "posts/hello.md",
            b"---\ntitle: \"Hello\"\ntags: [a, b]\n---\nWorld",
        )
        .unwrap();

        assert_eq!(record.get("contentId"), Some(&json!("posts/hello.md")));
        assert_eq!(record.get("title"), Some(&json!("Hello")));
        assert_eq!(record.get("path"), Some(&json!("/hello")));
        assert_eq!(record.get("stem"), Some(&json!("hello")));
        assert_eq!(record.get("extension"), Some(&json!("md")));

        // JSON fields leave the parser as encoded text.
        let tags = record.get("tags").unwrap().as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(tags).unwrap(), json!(["a", "b"]));
        let body = record.get("body").unwrap().as_str().unwrap();
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["type"], json!("root"));
        assert_eq!(body["children"][0]["children"][0]["value"], json!("World"));
    }

    #[test]
    fn title_defaults_from_first_heading_then_stem() {
        let record = build_record(&posts(), "posts/intro.md", b"# From Heading\n\nBody").unwrap();
        assert_eq!(record.get("title"), Some(&json!("From Heading")));

        let record = build_record(&posts(), "posts/getting-started.md", b"plain body").unwrap();
        assert_eq!(record.get("title"), Some(&json!("Getting Started")));
    }

    #[test]
    fn description_defaults_from_first_paragraph() {
        let record =
            build_record(&posts(), "posts/a.md", b"# T\n\nFirst paragraph here.").unwrap();
        assert_eq!(
            record.get("description"),
            Some(&json!("First paragraph here."))
        );
    }

    #[test]
    fn seo_defaults_from_title_and_description() {
        let record = build_record(&posts(), "posts/a.md", b"# T\n\nDesc.").unwrap();
        let seo: Value =
            serde_json::from_str(record.get("seo").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(seo, json!({ "title": "T", "description": "Desc." }));
    }

    #[test]
    fn unknown_front_matter_keys_collect_into_meta() {
        let record = build_record(
            &posts(),
            "posts/a.md",
            b"---\ntitle: A\ncustom: 7\n---\n",
        )
        .unwrap();
        let meta: Value =
            serde_json::from_str(record.get("meta").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(meta, json!({ "custom": 7 }));
    }

    #[test]
    fn yaml_data_document() {
        let record =
            build_record(&settings(), "settings/site.yml", b"name: Site\nlimit: 10\n").unwrap();
        assert_eq!(record.get("name"), Some(&json!("Site")));
        assert_eq!(record.get("limit"), Some(&json!(10)));
        assert_eq!(record.get("extension"), Some(&json!("yml")));
    }

    #[test]
    fn json_data_document() {
        let record = build_record(
            &settings(),
            "settings/site.json",
            br#"{ "name": "Site", "limit": 3 }"#,
        )
        .unwrap();
        assert_eq!(record.get("name"), Some(&json!("Site")));
    }

    #[test]
    fn unsupported_extension_rejected_for_data() {
        let err = build_record(&settings(), "settings/site.txt", b"name: Site").unwrap_err();
        assert!(err.to_string().contains(".txt"), "{err}");
    }

    #[test]
    fn unknown_extension_passes_through_for_pages() {
        let record = build_record(&posts(), "posts/raw.txt", b"just text").unwrap();
        let body: Value =
            serde_json::from_str(record.get("body").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(body["children"][0]["value"], json!("just text"));
    }

    #[test]
    fn missing_required_field_fails_validation() {
        let err = build_record(&settings(), "settings/site.yml", b"limit: 10\n").unwrap_err();
        assert!(err.to_string().contains("'name'"), "{err}");
    }

    #[test]
    fn unterminated_front_matter_fails() {
        assert!(build_record(&posts(), "posts/a.md", b"---\ntitle: A\n").is_err());
    }

    #[test]
    fn navigation_boolean_normalizes_to_object() {
        let record = build_record(
            &posts(),
            "posts/a.md",
            b"---\ntitle: A\nnavigation: false\n---\n",
        )
        .unwrap();
        let navigation: Value =
            serde_json::from_str(record.get("navigation").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(navigation, json!({ "enabled": false }));
    }

    #[test]
    fn route_paths() {
        assert_eq!(route_path("hello", None), "/hello");
        assert_eq!(route_path("index", None), "/");
        assert_eq!(route_path("guides/index", None), "/guides");
        assert_eq!(route_path("1.intro", None), "/intro");
        assert_eq!(route_path("Guides/Getting Started", None), "/guides/getting-started");
        assert_eq!(route_path("hello", Some("/blog")), "/blog/hello");
        assert_eq!(route_path("index", Some("/blog")), "/blog");
    }

    #[test]
    fn split_extension_handles_nested_and_bare_names() {
        assert_eq!(split_extension("guides/setup.md"), ("guides/setup", "md"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension("a.b/c"), ("a.b/c", ""));
    }

    #[tokio::test]
    async fn parse_content_wraps_failures_with_the_key() {
        let mut driver = MemoryDriver::new();
        driver.insert("bad.yml", b"limit: 10\n".to_vec());
        let mut storage = Storage::new();
        storage.mount("settings", Arc::new(driver));

        let err = parse_content(&storage, &settings(), "settings/bad.yml")
            .await
            .unwrap_err();
        match err {
            PressDbError::Parse { key, .. } => assert_eq!(key, "settings/bad.yml"),
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn parsing_is_pure_given_identical_bytes() {
        let bytes = b"---\ntitle: A\n---\nBody";
        let a = build_record(&posts(), "posts/a.md", bytes).unwrap();
        let b = build_record(&posts(), "posts/a.md", bytes).unwrap();
        assert_eq!(a, b);
    }
}
