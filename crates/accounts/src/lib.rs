//! Accounts domain module (event-sourced).
//!
//! A small identity-and-access bounded context used to exercise the runtime
//! end to end. Pure domain logic: no IO, no storage, no transport.

pub mod account;

pub use account::{
    AccountCommand, AccountEmailChanged, AccountEvent, AccountRegistered, AccountState,
    ChangeEmail, RegisterAccount,
};
