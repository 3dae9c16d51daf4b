pub mod http;
pub mod nslookup;
pub mod ping;
