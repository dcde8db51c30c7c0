//! Sparse, strongly typed updates.

use std::fmt;

/// A value that can absorb a sparse patch of its own fields.
///
/// Implemented by `#[derive(Patch)]`, which also generates the patch type.
/// Applying a patch twice has the same effect as applying it once, which the
/// sync engine relies on when it replays unconfirmed writes.
pub trait Patchable {
    type Patch: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Overwrite every field that is present in `patch`.
    fn apply_patch(&mut self, patch: &Self::Patch);
}
