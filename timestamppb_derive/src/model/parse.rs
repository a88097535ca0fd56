use syn::{
    Data, DeriveInput, Error, Expr, ExprLit, Fields, Ident, Lit, LitStr, Meta, Result, Type,
};

use crate::shared::{model_metas, to_snake_case};

#[derive(Debug)]
pub struct ModelConfig {
    pub table: String,
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug)]
pub struct FieldConfig {
    pub ident: Ident,
    pub ty: Type,
    pub column: String,
    pub primary_key: bool,
    pub serializer: Option<String>,
}

impl ModelConfig {
    pub fn from_input(input: &DeriveInput) -> Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(Error::new_spanned(
                &input.generics,
                "Model cannot be derived for generic structs",
            ));
        }

        let named = match &input.data {
            Data::Struct(s) => match &s.fields {
                Fields::Named(f) => &f.named,
                _ => {
                    return Err(Error::new_spanned(
                        &input.ident,
                        "Model only supports structs with named fields",
                    ));
                }
            },
            _ => {
                return Err(Error::new_spanned(
                    &input.ident,
                    "Model only supports structs",
                ));
            }
        };

        let mut table = None;
        for meta in model_metas(&input.attrs)? {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("table") => {
                    table = Some(string_value(&nv.value, "table")?.value());
                }
                other => {
                    return Err(Error::new_spanned(other, "unknown model attribute"));
                }
            }
        }
        let table = table.unwrap_or_else(|| format!("{}s", to_snake_case(&input.ident.to_string())));

        let mut fields = Vec::with_capacity(named.len());
        for field in named {
            let Some(ident) = field.ident.clone() else {
                continue;
            };

            let mut config = FieldConfig {
                column: ident.to_string(),
                ident,
                ty: field.ty.clone(),
                primary_key: false,
                serializer: None,
            };

            for meta in model_metas(&field.attrs)? {
                match meta {
                    Meta::Path(path) if path.is_ident("primary_key") => config.primary_key = true,
                    Meta::NameValue(nv) if nv.path.is_ident("column") => {
                        config.column = string_value(&nv.value, "column")?.value();
                    }
                    Meta::NameValue(nv) if nv.path.is_ident("serializer") => {
                        config.serializer = Some(string_value(&nv.value, "serializer")?.value());
                    }
                    other => {
                        return Err(Error::new_spanned(other, "unknown model field attribute"));
                    }
                }
            }

            fields.push(config);
        }

        let keys: Vec<_> = fields.iter().filter(|f| f.primary_key).collect();
        if keys.len() > 1 {
            return Err(Error::new_spanned(
                &keys[1].ident,
                "only one field can be marked #[model(primary_key)]",
            ));
        }

        Ok(Self { table, fields })
    }
}

fn string_value<'a>(expr: &'a Expr, name: &str) -> Result<&'a LitStr> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s),
        other => Err(Error::new_spanned(
            other,
            format!("{} must be a string literal", name),
        )),
    }
}
