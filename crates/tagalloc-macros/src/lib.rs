use proc_macro::TokenStream;
use quote::quote;
use syn::{Expr, ItemFn, parse_macro_input};

/// Attributes every allocation made while the function body runs to the given
/// owner.
///
/// ```rust,ignore
/// #[tagalloc::owned_by(0x0100_0007)]
/// fn handle_message(msg: &[u8]) -> Vec<u8> {
///     msg.to_vec()
/// }
/// ```
#[proc_macro_attribute]
pub fn owned_by(attr: TokenStream, item: TokenStream) -> TokenStream {
    let owner = parse_macro_input!(attr as Expr);
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let attrs = &input.attrs;
    let sig = &input.sig;
    let block = &input.block;

    if let Some(asyncness) = sig.asyncness {
        return syn::Error::new_spanned(
            asyncness,
            "#[owned_by] cannot be applied to async functions: owner scopes are thread-local and cannot span await points",
        )
        .to_compile_error()
        .into();
    }

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            let _tagalloc_owner = tagalloc::OwnerScope::enter(tagalloc::OwnerId::new(#owner));
            #block
        }
    };

    output.into()
}
