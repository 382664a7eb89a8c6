/// A message type with a stable contract name.
///
/// The contract name is what crosses process boundaries: the transport routes
/// on it and the handler registry dispatches on it. Renaming a Rust type must
/// not change it.
pub trait Contract {
    /// Stable identifier (e.g. "accounts.account.registered").
    fn contract_name(&self) -> &'static str;
}
