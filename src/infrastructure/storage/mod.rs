//! Storage infrastructure - repository selection

mod factory;

pub use factory::RepositoryFactory;
