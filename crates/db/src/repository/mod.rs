//! Repository functions, one per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! They speak rows; conversion to engine types happens in [`crate::store`].

pub mod definitions;
pub mod instances;
