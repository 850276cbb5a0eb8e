use heck::{ToPascalCase, ToSnakeCase};
use pressdb::schema::{FieldType, ItemType, ResolvedField};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Convert a collection name to its singular PascalCase struct name.
/// e.g. "posts" -> "Post", "categories" -> "Category"
pub fn collection_struct_name(collection_name: &str) -> String {
    singularize(collection_name).to_pascal_case()
}

/// Map a resolved field to its Rust type as a TokenStream. Optional fields
/// without defaults wrap in `Option`.
pub fn field_to_rust_type(field: &ResolvedField) -> TokenStream {
    let base_type = field_base_type(field);
    if !field.required && field.default.is_none() {
        quote! { Option<#base_type> }
    } else {
        base_type
    }
}

/// The base Rust type (without Option wrapping) for a field.
pub fn field_base_type(field: &ResolvedField) -> TokenStream {
    match &field.field_type {
        FieldType::String => quote! { String },
        FieldType::Number => quote! { f64 },
        FieldType::Boolean => quote! { bool },
        FieldType::Date => quote! { chrono::NaiveDate },
        FieldType::Datetime => quote! { chrono::DateTime<chrono::Utc> },
        FieldType::Object => quote! { serde_json::Value },
        FieldType::List => {
            let item = list_item_type(field);
            quote! { Vec<#item> }
        }
    }
}

fn list_item_type(field: &ResolvedField) -> TokenStream {
    match &field.items {
        Some(ItemType::Simple(name)) => match name.as_str() {
            "string" => quote! { String },
            "number" => quote! { f64 },
            "boolean" => quote! { bool },
            "date" => quote! { chrono::NaiveDate },
            "datetime" => quote! { chrono::DateTime<chrono::Utc> },
            _ => quote! { serde_json::Value },
        },
        Some(ItemType::Complex(_)) | None => quote! { serde_json::Value },
    }
}

/// Naive singularization of English words.
pub fn singularize(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with("ies") {
        format!("{}y", &w[..w.len() - 3])
    } else if w.ends_with("ses") || w.ends_with("xes") || w.ends_with("zes") {
        w[..w.len() - 2].to_string()
    } else if w.ends_with("ves") {
        format!("{}f", &w[..w.len() - 3])
    } else if w.ends_with('s') && !w.ends_with("ss") {
        w[..w.len() - 1].to_string()
    } else {
        w
    }
}

/// Convert a field name to a Rust identifier, handling keywords with raw
/// identifier syntax.
pub fn safe_field_ident(name: &str) -> proc_macro2::Ident {
    let snake = name.to_snake_case();
    match snake.as_str() {
        "type" | "struct" | "enum" | "fn" | "let" | "mut" | "ref" | "self" | "super" | "crate"
        | "mod" | "use" | "pub" | "impl" | "trait" | "for" | "loop" | "while" | "if" | "else"
        | "match" | "return" | "break" | "continue" | "as" | "in" | "where" | "async"
        | "await" | "dyn" | "move" | "static" | "const" | "unsafe" | "extern" | "true"
        | "false" | "try" => format_ident!("r#{}", snake),
        _ => format_ident!("{}", snake),
    }
}
