use crate::type_utils::{collection_struct_name, field_to_rust_type, safe_field_ident};
use pressdb::schema::ResolvedCollection;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Generate one record struct per collection, mirroring the extended schema
/// (generated fields included) in column order.
pub fn generate_structs(collections: &[ResolvedCollection]) -> TokenStream {
    let mut tokens = TokenStream::new();
    for collection in collections {
        if collection.name == pressdb::schema::INFO_COLLECTION {
            continue;
        }
        tokens.extend(generate_record_struct(collection));
    }
    tokens
}

fn generate_record_struct(collection: &ResolvedCollection) -> TokenStream {
    let struct_name = format_ident!("{}", collection_struct_name(&collection.name));
    let doc_comment = format!(
        " A record in the `{}` collection. Table: {}",
        collection.name, collection.table_name
    );

    let field_tokens: Vec<TokenStream> = collection
        .fields
        .iter()
        .map(|field| {
            let ident = safe_field_ident(&field.name);
            let ty = field_to_rust_type(field);
            // Columns keep their manifest names; rename where the Rust
            // identifier differs.
            let needs_rename = ident.to_string().trim_start_matches("r#") != field.name;
            if needs_rename {
                let name = &field.name;
                quote! {
                    #[serde(rename = #name)]
                    pub #ident: #ty,
                }
            } else {
                quote! {
                    pub #ident: #ty,
                }
            }
        })
        .collect();

    quote! {
        #[doc = #doc_comment]
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct #struct_name {
            #(#field_tokens)*
        }
    }
}
