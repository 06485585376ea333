use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemFn, parse_macro_input};

/// Runs an `async fn main` inside the runtime's main actor.
///
/// The runtime is configured from `CELLIO_*` environment variables and logging is initialised
/// with [`cellio::logging::init`].
#[proc_macro_attribute]
pub fn main(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;
    let output = &input.sig.output;

    // Ensure the function is async
    if input.sig.asyncness.is_none() {
        return quote! { compile_error!("The #[cellio::main] function must be async"); }.into();
    }

    if name != "main" {
        return quote! {
            compile_error!("#[cellio::main] can only be applied to the 'main' function");
        }
        .into();
    }

    let result = quote! {
        #(#attrs)*
        #vis fn main() #output {
            // 1. Bootstrap the runtime
            let config = ::cellio::Config::from_env().expect("cellio: invalid configuration");
            ::cellio::logging::init(&config.log_filter);
            let runtime = ::cellio::Runtime::new(config).expect("cellio: failed to start runtime");

            // 2. Run the user's main body inside the main actor
            let output = runtime
                .run(move || async move #body)
                .expect("cellio: main actor failed");

            runtime.shutdown();
            output
        }
    };
    result.into()
}

/// Runs an `async` test body inside a fresh actor of its own runtime.
///
/// A panic in the body crashes the actor and fails the test with the panic message.
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;

    if input.sig.asyncness.is_none() {
        return quote! { compile_error!("The #[cellio::test] function must be async"); }.into();
    }

    if !input.sig.inputs.is_empty() {
        return quote! { compile_error!("#[cellio::test] functions take no arguments"); }.into();
    }

    let result = quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis fn #name() {
            let runtime = ::cellio::Runtime::new(::cellio::Config::default())
                .expect("cellio: failed to start runtime");

            if let Err(e) = runtime.run(move || async move #body) {
                panic!("{e}");
            }
        }
    };
    result.into()
}
