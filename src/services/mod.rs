pub mod exporter;
pub mod families;
pub mod histogram;
pub mod registry;
