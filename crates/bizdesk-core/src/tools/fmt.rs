//! Display helpers for tool messages

/// Integer with thousands separators: `1234567` -> `1,234,567`
pub fn grouped(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Rupee amount rounded to whole units
pub fn rupees(amount: f64) -> String {
    format!("₹{}", grouped(amount.round() as i64))
}

/// Rupee amount with paise
pub fn inr(amount: f64) -> String {
    let paise = (amount * 100.0).round() as i64;
    let sign = if paise < 0 { "-" } else { "" };
    let paise = paise.abs();
    format!("{}₹{}.{:02}", sign, grouped(paise / 100), paise % 100)
}

/// First letter upper-cased
pub fn title(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(999), "999");
        assert_eq!(grouped(1000), "1,000");
        assert_eq!(grouped(-1234567), "-1,234,567");
        assert_eq!(rupees(29999.4), "₹29,999");
        assert_eq!(inr(1234.5), "₹1,234.50");
        assert_eq!(inr(-0.5), "-₹0.50");
        assert_eq!(title("gold"), "Gold");
    }
}
