mod model;
mod shared;

use proc_macro::TokenStream;

/// Implements `timestamppb::Model` for a struct with named fields.
///
/// ```rust,ignore
/// #[derive(Model)]
/// #[model(table = "users")]
/// struct User {
///     #[model(primary_key)]
///     id: Uuid,
///     #[model(column = "display_name")]
///     name: String,
///     #[model(serializer = "timestamppb")]
///     deleted_at: Option<Timestamp>,
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive(input)
}
