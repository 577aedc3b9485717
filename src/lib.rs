pub mod challenge;
pub mod cli;
pub mod google;
pub mod idp;
pub mod sesamo;
pub mod sms;
pub mod token;
