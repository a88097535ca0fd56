use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

use crate::{model::parse::ModelConfig, shared::import_timestamppb};

pub fn generate_model_impl(input: &DeriveInput) -> Result<TokenStream> {
    let tpb = import_timestamppb();
    let config = ModelConfig::from_input(input)?;

    let ident = &input.ident;
    let name = ident.to_string();
    let table = &config.table;
    let count = config.fields.len();

    let schema_fields = config.fields.iter().map(|f| {
        let name = f.ident.to_string();
        let column = &f.column;
        let ty = &f.ty;
        let primary_key = f.primary_key;
        let serializer = match &f.serializer {
            Some(s) => quote! { ::core::option::Option::Some(#s) },
            None => quote! { ::core::option::Option::None },
        };

        quote! {
            #tpb::Field {
                name: #name,
                column: #column,
                kind: <#ty as #tpb::FieldType>::KIND,
                nullable: <#ty as #tpb::FieldType>::NULLABLE,
                primary_key: #primary_key,
                serializer: #serializer,
            }
        }
    });

    let to_row = config.fields.iter().map(|f| {
        let field = &f.ident;
        let name = field.to_string();
        quote! { row.set(#name, #tpb::ToValue::to_value(&self.#field)); }
    });

    let from_row = config.fields.iter().map(|f| {
        let field = &f.ident;
        let name = field.to_string();
        let ty = &f.ty;
        quote! {
            #field: <#ty as #tpb::FromValue>::from_value(row.take(#name)?)?
        }
    });

    Ok(quote! {
        impl #tpb::Model for #ident {
            fn schema() -> &'static #tpb::Schema {
                static FIELDS: [#tpb::Field; #count] = [#(#schema_fields),*];
                static SCHEMA: #tpb::Schema = #tpb::Schema {
                    name: #name,
                    table: #table,
                    fields: &FIELDS,
                };
                &SCHEMA
            }

            fn to_row(&self) -> #tpb::Row {
                let mut row = #tpb::Row::new();
                #(#to_row)*
                row
            }

            fn from_row(mut row: #tpb::Row) -> ::core::result::Result<Self, #tpb::Error> {
                ::core::result::Result::Ok(Self {
                    #(#from_row,)*
                })
            }
        }
    })
}
