pub mod message;
pub mod options;
pub mod request;
pub mod response;
pub mod tool;
