use pressdb::schema::{CollectionType, ResolvedCollection};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Generate the collections-index artifact: a `collections()` function
/// enumerating every resolved collection (name, table, shape) for runtime
/// lookup.
pub fn generate_index(collections: &[ResolvedCollection]) -> TokenStream {
    let entries: Vec<TokenStream> = collections
        .iter()
        .map(|collection| {
            let name = &collection.name;
            let pascal_name = &collection.pascal_name;
            let table_name = &collection.table_name;
            let kind = match collection.kind {
                CollectionType::Page => format_ident!("Page"),
                CollectionType::Data => format_ident!("Data"),
            };
            let json_fields = collection.json_fields.iter();
            quote! {
                pressdb::schema::CollectionInfo {
                    name: #name.to_string(),
                    pascal_name: #pascal_name.to_string(),
                    table_name: #table_name.to_string(),
                    kind: pressdb::schema::CollectionType::#kind,
                    json_fields: vec![#(#json_fields.to_string()),*],
                }
            }
        })
        .collect();

    quote! {
        /// Resolved collection metadata, in declaration order.
        pub fn collections() -> Vec<pressdb::schema::CollectionInfo> {
            vec![#(#entries),*]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressdb::schema::{parse_manifest_str, resolve_collections};
    use std::path::Path;

    #[test]
    fn index_lists_every_collection_including_info() {
        let manifest = parse_manifest_str(
            r#"
collections:
  posts:
    type: page
    fields:
      tags: { type: list, items: string }
"#,
            Path::new("/data"),
        )
        .unwrap();
        let collections = resolve_collections(&manifest).unwrap();
        let code = generate_index(&collections).to_string();

        assert!(code.contains("fn collections"));
        assert!(code.contains("content_posts"));
        assert!(code.contains("content__info"));
        assert!(code.contains("\"tags\""));
    }
}
