pub mod messages;
pub mod serialize;
pub mod signature_buff;
