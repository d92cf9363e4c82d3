pub mod dispatcher;
pub mod generation;
pub mod types;
pub mod whatsapp;


pub use dispatcher::MessageDispatcher;
pub use generation::{GenerationOrchestrator, SessionOutcome};
pub use types::{DeliveryChannel, DispatchResult, NormalizedMessage};
pub use whatsapp::WhatsAppChannel;
