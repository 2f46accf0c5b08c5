pub mod clock;
pub mod token;

pub use clock::{Clock, FixedClock, SystemClock};
pub use token::{AuthError, Claims, TokenService, TokenSettings, TokenSubject};
