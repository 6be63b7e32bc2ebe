pub mod configuration;
pub mod entry;
pub mod errors;
pub mod settings;

pub use configuration::*;
pub use entry::*;
pub use errors::*;
pub use settings::*;
