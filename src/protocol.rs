//! Wire-format records exchanged with the authorization and token endpoints.

pub mod authorization;
pub mod cli_telem;
pub mod grant;
pub mod query;
pub mod secret;
pub mod token;

pub use authorization::*;
pub use cli_telem::*;
pub use grant::*;
pub use query::*;
pub use secret::*;
pub use token::*;
