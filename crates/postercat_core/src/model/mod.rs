//! Catalog domain model.
//!
//! # Responsibility
//! - Define the list, poster and list-membership records shared by
//!   repositories and services.
//!
//! # Invariants
//! - A poster belongs to at most one list at a time.
//! - Membership positions in one list are exactly `1..=N`.

pub mod catalog;
