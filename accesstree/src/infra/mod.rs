//! Infrastructure: SeaORM entities, schema migrations and repository
//! implementations.

pub mod storage;
