use chrono::Utc;
use rand::Rng;

const SUFFIX_LEN: usize = 9;

/// `session_<epoch ms>_<9 random base-36 chars>`.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| {
            let digit = rng.gen_range(0..36);
            std::char::from_digit(digit, 36).unwrap_or('0')
        })
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}
