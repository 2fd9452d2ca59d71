//! Authentication core: session tokens, authorization codes, email
//! verification codes and password hashing.

pub mod clock;
pub mod email_code;
pub mod error;
pub mod exchange;
pub mod extract;
pub mod password;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email_code::{EmailCodeConfig, EmailCodes};
pub use error::{AuthError, EmailCodeError, ExchangeError, PasswordError, TokenError};
pub use exchange::CodeExchange;
pub use extract::{TokenExtractors, TokenSource};
pub use password::{hash_password, verify_password};
pub use token::{SessionClaims, TokenConfig, TokenService, Validation};
