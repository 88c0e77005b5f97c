pub mod settings_models;

pub use settings_models::*;
