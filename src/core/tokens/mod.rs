mod store;

pub use store::{MAX_TOKEN_TTL, Token, TokenStore, TokenValue};
