pub mod errors;
pub mod gateway;
pub mod ids;
pub mod phone;
pub mod replies;
pub mod security;

pub use errors::GatewayError;
pub use gateway::{Delivery, SmsGateway};
pub use phone::{Phone, PhoneError};
pub use replies::{Reply, ReplyPayload};
