pub mod currency;
pub mod password;
pub mod random;

pub use currency::{Currency, CurrencyError, is_supported_currency};
pub use password::{check_password, hash_password};
pub use random::{random_secret_code, random_string};
