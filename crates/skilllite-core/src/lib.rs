pub mod config;
pub mod observability;
pub mod path_validation;
pub mod planning;
pub mod protocol;
pub mod scan_cache;
pub mod skill;
