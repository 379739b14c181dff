pub mod mock;
pub mod telerivet;

pub use mock::{FailingGateway, RecordingGateway, SentMessage};
pub use telerivet::{TelerivetClient, TelerivetConfig, DEFAULT_BASE_URL};
