use chrono::NaiveDate;
use sha1::{Digest, Sha1};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TOKEN_LEN: u32 = 5;

/// Generates the short per-day token for a customer ticket.
///
/// The token is derived from `(bakery_id, ticket_id, local date)` and encoded
/// into at most 5 base36 characters, so it is compact enough for QR codes
/// while remaining stable for that day.
///
/// # Returns
/// Returns the token string; leading zeros are stripped and an all-zero
/// value collapses to `"0"`.
pub fn daily_customer_token(bakery_id: u32, ticket_id: u32, local_date: NaiveDate) -> String {
    let payload = format!("{}-{}-{}", bakery_id, ticket_id, local_date.format("%Y-%m-%d"));

    let digest = Sha1::digest(payload.as_bytes());

    // Map the first 4 bytes into the range [0, 36^5) and encode in base36.
    let mut num = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as u64;
    num %= 36u64.pow(TOKEN_LEN);

    let mut chars: Vec<u8> = Vec::with_capacity(TOKEN_LEN as usize);
    for _ in 0..TOKEN_LEN {
        chars.push(ALPHABET[(num % 36) as usize]);
        num /= 36;
    }
    chars.reverse();

    let token: String = String::from_utf8(chars).expect("alphabet is ascii");
    let token = token.trim_start_matches('0').to_string();

    if token.is_empty() { "0".to_string() } else { token }
}
