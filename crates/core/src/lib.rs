//! `repset-core` — shared domain primitives.
//!
//! Pure types only: identifiers, the domain error model, and the aggregate
//! contract. No IO, no framework code.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
