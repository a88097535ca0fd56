use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Attribute, Error, Meta, Result, punctuated::Punctuated};

pub fn import_timestamppb() -> proc_macro2::TokenStream {
    // This finds the timestamppb crate in the user's dependencies
    let found_crate = crate_name("timestamppb").unwrap_or(FoundCrate::Itself);

    match found_crate {
        FoundCrate::Itself => quote! { ::timestamppb },
        FoundCrate::Name(name) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote! { ::#ident }
        }
    }
}

/// Flatten every `#[model(...)]` attribute into its nested metas.
pub fn model_metas(attrs: &[Attribute]) -> Result<Vec<Meta>> {
    let mut metas = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        let nested = attr
            .parse_args_with(Punctuated::<Meta, syn::Token![,]>::parse_terminated)
            .map_err(|e| {
                Error::new_spanned(attr, format!("Failed to parse model attributes: {}", e))
            })?;
        metas.extend(nested);
    }

    Ok(metas)
}

/// `UserAccount` -> `user_account`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
