use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::parse::Parser;
use syn::spanned::Spanned;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

const KNOWN_OPTIONS: &str = "expected one of: `failure_policy`, `max_rounds`";

pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    expand_entry(args, item, false)
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    expand_entry(args, item, true)
}

fn expand_entry(args: TokenStream, item: TokenStream, is_test: bool) -> TokenStream {
    // On error we still expand to something close to the expected output so
    // IDE completions keep working inside the function body.
    let input: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = AttributeArgs::parse_terminated
        .parse2(args)
        .and_then(|args| build_config(&input, args, is_test));

    match config {
        Ok(config) => expand(input, is_test, config),
        Err(e) => token_stream_with_error(expand(input, is_test, FinalConfig::default()), e),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FailurePolicy {
    Propagate,
    Isolate,
}

impl FailurePolicy {
    fn from_str(s: &str) -> Result<FailurePolicy, String> {
        match s {
            "propagate" => Ok(FailurePolicy::Propagate),
            "isolate" => Ok(FailurePolicy::Isolate),
            _ => Err(format!(
                "No such failure policy `{s}`. The failure policies are `propagate` and `isolate`."
            )),
        }
    }

    fn as_path(self) -> TokenStream {
        match self {
            FailurePolicy::Propagate => quote! { turnstile::runtime::FailurePolicy::Propagate },
            FailurePolicy::Isolate => quote! { turnstile::runtime::FailurePolicy::Isolate },
        }
    }
}

#[derive(Default)]
struct FinalConfig {
    failure_policy: Option<FailurePolicy>,
    max_rounds: Option<u64>,
}

fn build_config(
    input: &syn::ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    if !input.sig.inputs.is_empty() {
        let msg = "the entry function cannot accept arguments";
        return Err(syn::Error::new_spanned(&input.sig.inputs, msg));
    }

    if is_test && let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        return Err(syn::Error::new_spanned(attr, msg));
    }

    let mut config = FinalConfig::default();

    for arg in args {
        let namevalue = match arg {
            syn::Meta::NameValue(namevalue) => namevalue,
            other => {
                let msg = format!("Options must be written as `name = value`, {KNOWN_OPTIONS}.");
                return Err(syn::Error::new_spanned(other, msg));
            }
        };

        let ident = namevalue
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new_spanned(&namevalue, "Must have specified ident"))?
            .to_string();

        let lit = match &namevalue.value {
            syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
            expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
        };

        match ident.as_str() {
            "failure_policy" => {
                if config.failure_policy.is_some() {
                    return Err(syn::Error::new(lit.span(), "`failure_policy` set multiple times."));
                }
                let policy = parse_string(lit, lit.span(), "failure_policy")?;
                let policy = FailurePolicy::from_str(&policy)
                    .map_err(|err| syn::Error::new(lit.span(), err))?;
                config.failure_policy = Some(policy);
            }
            "max_rounds" => {
                if config.max_rounds.is_some() {
                    return Err(syn::Error::new(lit.span(), "`max_rounds` set multiple times."));
                }
                let rounds = parse_u64(lit, lit.span(), "max_rounds")?;
                if rounds == 0 {
                    return Err(syn::Error::new(lit.span(), "`max_rounds` may not be 0."));
                }
                config.max_rounds = Some(rounds);
            }
            name => {
                let msg = format!("Unknown attribute {name} is specified; {KNOWN_OPTIONS}.");
                return Err(syn::Error::new_spanned(namevalue, msg));
            }
        }
    }

    Ok(config)
}

fn expand(mut input: syn::ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    input.sig.asyncness = None;

    // Type mismatches are reported on the last statement, so the generated
    // code borrows its span.
    let span = input
        .block
        .stmts
        .last()
        .map_or_else(Span::call_site, |stmt| stmt.span());

    let mut scheduler = quote_spanned! {span=> turnstile::runtime::Builder::new() };

    if let Some(policy) = config.failure_policy {
        let policy = policy.as_path();
        scheduler = quote_spanned! {span=> #scheduler.failure_policy(#policy) };
    }

    if let Some(rounds) = config.max_rounds {
        scheduler = quote_spanned! {span=> #scheduler.max_rounds(#rounds) };
    }

    let body = &input.block;
    let block: syn::Block = syn::parse_quote_spanned! {span=>
        {
            let body = async move #body;

            #[allow(clippy::expect_used, clippy::needless_return)]
            {
                return #scheduler
                    .try_build()
                    .expect("Failed building the Scheduler")
                    .block_on(body);
            }
        }
    };
    input.block = Box::new(block);

    let generated_attrs = if is_test {
        quote! { #[::core::prelude::v1::test] }
    } else {
        quote! {}
    };

    quote! {
        #generated_attrs
        #input
    }
}
