use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let options = match extract_options(&input) {
        Ok(options) => options,
        Err(err) => return err.to_compile_error().into(),
    };
    let table = options
        .table
        .unwrap_or_else(|| format!("{}s", to_snake_case(&name.to_string())));

    let id_field = match extract_id_field(&input) {
        Ok(field) => field,
        Err(err) => return err.to_compile_error().into(),
    };

    let validate = options.validate.map(|path| {
        quote! {
            fn validate(&self) -> ::std::result::Result<(), ::std::string::String> {
                #path(self)
            }
        }
    });

    let expanded = quote! {
        impl funnel_sync::Record for #name {
            const TABLE: &'static str = #table;

            fn id(&self) -> &str {
                &self.#id_field
            }

            #validate
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct RecordOptions {
    table: Option<String>,
    validate: Option<syn::Path>,
}

fn extract_options(input: &DeriveInput) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                options.table = Some(value.value());
            } else if meta.path.is_ident("validate") {
                let value: LitStr = meta.value()?.parse()?;
                options.validate = Some(value.parse()?);
            } else {
                return Err(meta.error("expected `table` or `validate`"));
            }
            Ok(())
        })?;
    }

    Ok(options)
}

fn extract_id_field(input: &DeriveInput) -> syn::Result<syn::Ident> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(&input.ident, "Record derive: expected a struct"));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Record derive: expected named fields",
        ));
    };

    let mut marked = None;
    for field in &named.named {
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("record")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    marked = field.ident.clone();
                    Ok(())
                } else {
                    Err(meta.error("expected `id`"))
                }
            })?;
        }
    }

    marked
        .or_else(|| {
            named
                .named
                .iter()
                .filter_map(|field| field.ident.clone())
                .find(|ident| ident == "id")
        })
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "Record derive: mark the key with #[record(id)] or name it `id`",
            )
        })
}

/// `AdRecord` -> `ad_record`
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, ch) in name.char_indices() {
        if ch.is_uppercase() && idx > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}
