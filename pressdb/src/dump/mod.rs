use crate::content::{self, ParsedRecord};
use crate::error::{PressDbError, Result};
use crate::schema::{ResolvedCollection, INFO_COLLECTION};
use crate::storage::Storage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{Map, Value};
use std::io::{Read, Write};

/// Keys are parsed in concurrent batches of this size; batches themselves
/// run sequentially to bound peak storage fan-out.
pub const BATCH_SIZE: usize = 25;

/// Generate the full ordered SQL statement sequence: per collection in
/// declaration order, DDL then one insert per key (in key order), closed by
/// the single `_info` version row.
///
/// Any parse failure aborts the whole generation; a partially-populated
/// table set is never produced.
pub async fn generate_sql_dump(
    storage: &Storage,
    collections: &[ResolvedCollection],
    integrity_version: &str,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();

    for collection in collections {
        statements.push(collection.table_definition.clone());
        if collection.source.is_none() {
            continue;
        }

        let keys = storage.get_keys(&collection.name).await?;
        log::debug!(
            "Dumping collection '{}': {} keys",
            collection.name,
            keys.len()
        );

        for batch in keys.chunks(BATCH_SIZE) {
            // try_join_all returns results in input order, so insert
            // emission follows key order regardless of completion order.
            let records = futures::future::try_join_all(
                batch
                    .iter()
                    .map(|key| content::parse_content(storage, collection, key)),
            )
            .await?;

            for record in &records {
                statements.push(generate_collection_insert(collection, record)?);
            }
        }
    }

    let info = collections
        .iter()
        .find(|c| c.name == INFO_COLLECTION)
        .ok_or_else(|| {
            PressDbError::Schema(format!("Missing reserved collection '{INFO_COLLECTION}'"))
        })?;
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::String("version".to_string()));
    fields.insert(
        "version".to_string(),
        Value::String(integrity_version.to_string()),
    );
    statements.push(generate_collection_insert(info, &ParsedRecord { fields })?);

    Ok(statements)
}

/// Render one insert statement for a parsed record. JSON fields arrive
/// already encoded as text; scalar fields become typed literals.
pub fn generate_collection_insert(
    collection: &ResolvedCollection,
    record: &ParsedRecord,
) -> Result<String> {
    let mut columns = Vec::with_capacity(collection.fields.len());
    let mut values = Vec::with_capacity(collection.fields.len());

    for field in &collection.fields {
        columns.push(format!("\"{}\"", field.name));
        let value = record.get(&field.name).unwrap_or(&Value::Null);
        values.push(sql_literal(&field.name, value)?);
    }

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({});",
        collection.table_name,
        columns.join(", "),
        values.join(", ")
    ))
}

fn sql_literal(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(true) => Ok("1".to_string()),
        Value::Bool(false) => Ok("0".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(quote(s)),
        Value::Array(_) | Value::Object(_) => Err(PressDbError::Validation(format!(
            "Field '{field}' reached the SQL layer without JSON encoding"
        ))),
    }
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Package a statement sequence for embedding: JSON-encoded, deflated and
/// base64'd. Smaller shipped payload for one-time build CPU.
pub fn package_dump(statements: &[String]) -> Result<String> {
    let json = serde_json::to_vec(statements)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`package_dump`], used once at load time.
pub fn unpack_dump(artifact: &str) -> Result<Vec<String>> {
    let compressed = BASE64
        .decode(artifact.trim())
        .map_err(|e| PressDbError::Other(format!("Invalid dump artifact encoding: {e}")))?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
