pub mod error;
pub mod port;
pub mod reference;
pub mod settings;

pub use error::{CoreError, CoreResult};
pub use port::{Direction, Operator, Port, PortSet, PortState};
pub use reference::{Identifier, RefSegment, Reference};
pub use settings::{Settings, SettingsStore, Value, ValueKind};
