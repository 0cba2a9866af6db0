pub mod checks;
pub mod rooms;
pub mod styles;

pub use checks::{CheckCatalog, CheckDefinition, CheckResult};
pub use rooms::{LayoutTemplate, RoomType};
pub use styles::DesignStyle;
