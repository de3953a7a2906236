pub mod comm;
pub mod config;
pub mod id;
pub mod resources;
pub mod spec;
pub mod wrapped;

pub use self::config::Config;
pub use self::resources::Resources;
pub use self::spec::TaskSpec;
