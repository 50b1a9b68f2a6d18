use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of email verification codes
pub const SECRET_CODE_LEN: usize = 32;

pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn random_secret_code() -> String {
    random_string(SECRET_CODE_LEN)
}
