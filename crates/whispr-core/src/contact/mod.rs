pub mod codec;
pub mod model;
pub mod store;

pub use codec::{is_valid_email, ContactCodec, ContactDescriptor, APP_IDENTIFIER, PROTOCOL_VERSION};
pub use model::{ContactExport, ContactRecord, LastMessage};
pub use store::{ContactStore, FileRegistry, MemoryRegistry, RegistryBackend};
