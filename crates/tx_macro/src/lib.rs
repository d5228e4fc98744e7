extern crate proc_macro;

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned as _, FnArg, ItemFn, Pat, PatType};

/// Runs the method body inside a transaction on its `session` argument.
///
/// The body moves to `<name>_inner`; the generated `<name>` begins the
/// transaction, commits on `Ok` and aborts on `Err`. The error type must
/// implement `From<eyre::Error>`. Calling crates need `model` and `log`.
#[proc_macro_attribute]
pub fn tx(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);
    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let block = &input_fn.block;
    let fn_name = &input_fn.sig.ident;
    let fn_args = &input_fn.sig.inputs;
    let fn_return = &input_fn.sig.output;
    let where_clause = &input_fn.sig.generics.where_clause;
    let generic_params = &input_fn.sig.generics.params;

    let mut has_session = false;
    let mut arg_list = Vec::with_capacity(fn_args.len());
    for arg in fn_args {
        match arg {
            FnArg::Receiver(_) => arg_list.push(quote!(self)),
            FnArg::Typed(PatType { pat, .. }) => match pat.as_ref() {
                Pat::Ident(ident) => {
                    let ident = &ident.ident;
                    if ident == "session" {
                        has_session = true;
                    }
                    arg_list.push(quote!(#ident));
                }
                other => {
                    return syn::Error::new(other.span(), "#[tx] arguments must be plain identifiers")
                        .to_compile_error()
                        .into();
                }
            },
        }
    }

    if !has_session {
        return syn::Error::new(
            input_fn.sig.span(),
            "#[tx] requires a `session` argument",
        )
        .to_compile_error()
        .into();
    }

    let inner_name = format_ident!("{}_inner", fn_name);
    let gen = quote! {
        async fn #inner_name<#generic_params>(#fn_args) #fn_return #where_clause #block

        #(#attrs)*
        #vis async fn #fn_name<#generic_params>(#fn_args) #fn_return #where_clause {
            ::model::session::Transaction::begin(&mut *session).await?;
            match Self::#inner_name(#(#arg_list),*).await {
                Ok(result) => {
                    ::model::session::Transaction::commit(&mut *session).await?;
                    Ok(result)
                }
                Err(err) => {
                    if let Err(abort_err) = ::model::session::Transaction::abort(&mut *session).await {
                        ::log::error!(
                            "Failed to abort transaction in {}: {:#}",
                            stringify!(#fn_name),
                            abort_err
                        );
                    }
                    Err(err)
                }
            }
        }
    };

    TokenStream::from(gen)
}
