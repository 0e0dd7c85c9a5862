#![allow(unknown_lints)]
#![allow(require_stability_comment)]

use proc_macro::TokenStream;

use proc_macro2::{Ident, Span};

#[macro_use]
extern crate quote;

/// Runs generator `N` from `bcache_tests::imagegen::generators` over a fresh
/// temporary file and evaluates to that `NamedTempFile`.
#[cfg(not(tarpaulin_include))]
#[proc_macro]
pub fn generate_image(input: TokenStream) -> TokenStream {
    let item: syn::LitInt = syn::parse(input).expect("failed to parse input");
    let num_to_gen = item.base10_parse::<usize>().unwrap();
    let generate_fn = Ident::new(
        format!("generate_{:04}", num_to_gen).as_str(),
        Span::call_site(),
    );
    let output = quote! {
        {
            let image = tempfile::NamedTempFile::new().unwrap();
            #generate_fn(image.as_file());
            image
        }
    };
    output.into()
}

/// Returns early with `Err(error.into())` when the condition does not hold.
#[cfg(not(tarpaulin_include))]
#[proc_macro]
pub fn assert_or_err(input: TokenStream) -> TokenStream {
    let params = syn::parse_macro_input!(input with syn::punctuated::Punctuated<syn::Expr, syn::Token![,]>::parse_separated_nonempty);
    assert_eq!(params.len(), 2);
    let test = &params[0];
    let error = &params[1];
    let output = quote! {
        if !(#test) {
            return Err(#error.into());
        }
    };
    output.into()
}

/// A `#[test]` that initialises logging before running its body.
#[cfg(not(tarpaulin_include))]
#[proc_macro_attribute]
pub fn test_bcache(_: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = syn::parse_macro_input!(item as syn::ItemFn);
    let input_sig = input_fn.sig.clone();
    let input_blk = input_fn.block.stmts.clone();
    let output = quote! {
        #[test]
        #input_sig {
            bcache::test::logging::init_log();
            #(#input_blk)*
        }
    };
    output.into()
}
