//! keyproof shared library: IDs, wire types, and errors shared between the
//! key directory and its clients.

pub mod api;
pub mod constants;
pub mod error;
pub mod ids;
