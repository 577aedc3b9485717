pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        token_key: String,
        token_issuer: String,
        token_audience: String,
        session_key: Option<SecretString>,
        google_client_id: Option<String>,
        otp_ttl: i64,
        otp_max_attempts: u32,
        otp_length: u32,
        sms_dev_echo: bool,
    },
}
