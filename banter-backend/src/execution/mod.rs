pub mod registry;

pub use registry::{CancellationRegistry, GenerationTicket};
