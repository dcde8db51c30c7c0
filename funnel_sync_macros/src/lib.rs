mod patch;
mod record;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Patch)] derive macro
// ============================================================================

/// Derive macro that generates a sparse `<Name>Patch` struct and the
/// `Patchable` implementation that merges it into the full value.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Patch)]
/// #[serde(rename_all = "camelCase")]
/// #[patch(rename_all = "camelCase")]
/// struct Settings {
///     pub initial_title: String,
///     pub initial_timer_seconds: u32,
/// }
///
/// let patch = SettingsPatch {
///     initial_title: Some("Hold on".into()),
///     ..Default::default()
/// };
/// settings.apply_patch(&patch);
/// ```
///
/// - `#[patch(rename_all = "...")]` sets the serde naming of the patch
///   struct so it accepts the same keys as the full value.
/// - `#[patch(skip)]` on a field keeps it out of the patch (ids, creation
///   timestamps).
///
/// The generated patch rejects unknown keys when deserialized.
#[proc_macro_derive(Patch, attributes(patch))]
pub fn derive_patch(input: TokenStream) -> TokenStream {
    patch::derive_patch(input)
}

// ============================================================================
// #[derive(Record)] derive macro
// ============================================================================

/// Derive macro for the `Record` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Debug, Serialize, Deserialize, Record)]
/// #[record(table = "ad_units", validate = "AdRecord::check")]
/// struct AdRecord {
///     #[record(id)]
///     pub id: String,
///     pub name: String,
/// }
/// ```
///
/// - `#[record(table = "...")]` sets the remote table name.
///   If omitted, defaults to snake_case struct name + "s".
/// - `#[record(validate = "path")]` names a `fn(&Self) -> Result<(), String>`
///   run before a row is accepted into the collection.
/// - `#[record(id)]` marks the field used as the unique identifier.
///   If omitted, defaults to a field named `id`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
