//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod farms;
pub mod profiles;
pub mod references;
pub mod settings;
pub mod system_logs;
pub mod tokens;
pub mod visitors;

pub use bootstrap::BootstrapRepo;
pub use farms::FarmRepo;
pub use profiles::ProfileRepo;
pub use references::{ReferenceRepo, ReferenceSource};
pub use settings::SettingsRepo;
pub use system_logs::SystemLogRepo;
pub use tokens::TokenRepo;
pub use visitors::VisitorRepo;
