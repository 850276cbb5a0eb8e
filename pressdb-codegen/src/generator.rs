use crate::{index_gen, struct_gen};
use pressdb::schema::ResolvedCollection;
use proc_macro2::TokenStream;
use quote::quote;

/// Generate the complete output file: imports, the collections index and
/// one typed record struct per collection.
pub fn generate_all(collections: &[ResolvedCollection]) -> TokenStream {
    let mut tokens = TokenStream::new();

    tokens.extend(quote! {
        //! Generated by pressdb-codegen. Do not edit.
        use serde::{Deserialize, Serialize};
    });

    tokens.extend(index_gen::generate_index(collections));
    tokens.extend(struct_gen::generate_structs(collections));

    tokens
}

/// Pretty-print a token stream as a formatted Rust source file.
pub fn format_token_stream(tokens: &TokenStream) -> String {
    let file = syn::parse2(tokens.clone()).expect("generated tokens form a valid file");
    prettyplease::unparse(&file)
}
