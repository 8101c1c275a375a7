//! Membership use cases.
//!
//! # Responsibility
//! - Plan position shifts ([`reindex`]) without touching storage.
//! - Run add / move / reposition / delete as atomic store transactions
//!   ([`membership_service`]).

pub mod membership_service;
pub mod reindex;
