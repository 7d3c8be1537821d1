use super::Store;

/// Typed binding between one schema and its store session.
///
/// Application schemas are plain structs owning a `Store`:
///
/// ```ignore
/// struct AccountContext { store: Store }
///
/// impl DbContext for AccountContext {
///     fn store(&self) -> &Store { &self.store }
/// }
/// ```
///
/// A context is owned by exactly one unit of work; repositories reach it
/// through a non-owning handle.
pub trait DbContext: 'static {
    fn store(&self) -> &Store;

    /// Diagnostic name used in log events and error messages.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Strips module paths from a `type_name` result, keeping generics intact
/// only for the outer type name (`a::b::Ctx<x::Y>` -> `Ctx`).
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
