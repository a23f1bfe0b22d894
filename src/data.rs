pub mod domain;
pub mod record;
pub mod registry;
