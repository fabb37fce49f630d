//! Dial-link normalization for contact phone numbers

/// Build a `tel:` reference from a free-form phone number.
///
/// All non-digit characters are dropped. Ten remaining digits are taken to be
/// a North American number without its country code and get a leading `1`.
/// Anything else passes through unvalidated.
pub fn dial_reference(phone: &str) -> String {
    let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        digits.insert(0, '1');
    }
    format!("tel:+{}", digits)
}
