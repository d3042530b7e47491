use proc_macro2::{Span, TokenStream};
use syn::Attribute;

pub(crate) fn parse_string(lit: &syn::Lit, span: Span, field: &str) -> Result<String, syn::Error> {
    match lit {
        syn::Lit::Str(s) => Ok(s.value()),
        _ => Err(syn::Error::new(
            span,
            format!("`{field}` expects a string literal."),
        )),
    }
}

pub(crate) fn parse_u64(lit: &syn::Lit, span: Span, field: &str) -> Result<u64, syn::Error> {
    let syn::Lit::Int(int) = lit else {
        return Err(syn::Error::new(
            span,
            format!("`{field}` expects an integer literal."),
        ));
    };

    int.base10_parse::<u64>().map_err(|e| {
        syn::Error::new(span, format!("Failed to parse value of `{field}`: {e}"))
    })
}

/// Matches `#[test]`, `#[core::prelude::*::test]` and `#[std::prelude::*::test]`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let syn::Meta::Path(path) = &attr.meta else {
        return false;
    };

    let idents: Vec<String> = path
        .segments
        .iter()
        .filter(|segment| segment.arguments.is_none())
        .map(|segment| segment.ident.to_string())
        .collect();

    if idents.len() != path.segments.len() {
        return false;
    }

    match idents.as_slice() {
        [test] => path.leading_colon.is_none() && test == "test",
        [root, prelude, _, test] => {
            (root == "core" || root == "std") && prelude == "prelude" && test == "test"
        }
        _ => false,
    }
}

pub(crate) fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}
