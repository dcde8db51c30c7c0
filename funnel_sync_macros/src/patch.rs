use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, LitStr};

pub fn derive_patch(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let vis = &input.vis;
    let patch_name = format_ident!("{}Patch", name);

    let rename_all = match extract_rename_all(&input) {
        Ok(rename_all) => rename_all,
        Err(err) => return err.to_compile_error().into(),
    };

    let fields = match named_fields(&input) {
        Ok(fields) => fields,
        Err(err) => return err.to_compile_error().into(),
    };

    let mut idents = Vec::new();
    let mut types = Vec::new();
    for field in fields {
        match is_skipped(field) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => return err.to_compile_error().into(),
        }
        if let Some(ident) = &field.ident {
            idents.push(ident.clone());
            types.push(field.ty.clone());
        }
    }

    let rename_attr = rename_all.map(|rule| quote! { #[serde(rename_all = #rule)] });
    let doc = format!(
        "Sparse update for [`{}`]. `None` leaves the field untouched.",
        name
    );

    let expanded = quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(deny_unknown_fields)]
        #rename_attr
        #vis struct #patch_name {
            #(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub #idents: ::std::option::Option<#types>,
            )*
        }

        impl #patch_name {
            /// True when the patch would not change anything.
            pub fn is_empty(&self) -> bool {
                true #(&& self.#idents.is_none())*
            }
        }

        impl funnel_sync::Patchable for #name {
            type Patch = #patch_name;

            fn apply_patch(&mut self, patch: &Self::Patch) {
                #(
                    if let ::std::option::Option::Some(value) = &patch.#idents {
                        self.#idents = ::std::clone::Clone::clone(value);
                    }
                )*
            }
        }

        impl ::std::convert::From<#name> for #patch_name {
            fn from(value: #name) -> Self {
                Self {
                    #( #idents: ::std::option::Option::Some(value.#idents), )*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn named_fields(
    input: &DeriveInput,
) -> syn::Result<&syn::punctuated::Punctuated<Field, syn::token::Comma>> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            return Ok(&fields.named);
        }
    }
    Err(syn::Error::new_spanned(
        &input.ident,
        "Patch derive: only structs with named fields are supported",
    ))
}

fn extract_rename_all(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut rename_all = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("patch") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                rename_all = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `rename_all`"))
            }
        })?;
    }
    Ok(rename_all)
}

fn is_skipped(field: &Field) -> syn::Result<bool> {
    let mut skipped = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("patch") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skipped = true;
                Ok(())
            } else {
                Err(meta.error("expected `skip`"))
            }
        })?;
    }
    Ok(skipped)
}
