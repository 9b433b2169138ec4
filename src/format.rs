//! Text formatting shared by the HTML views and the report exports.

/// `delay_hours` -> `Delay Hours`.
///
/// Each word is capitalised and the rest of it lowercased.
pub fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Two decimal places with comma thousands separators: `1,234,567.89`.
pub fn with_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// Plain number text; whole numbers lose their fraction.
pub fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Summary cells render missing values as `0`.
pub fn amount_or_zero(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_matches_header_style() {
        assert_eq!(title_case("delay_hours"), "Delay Hours");
        assert_eq!(title_case("route_id"), "Route Id");
        assert_eq!(title_case("total_COST_saved"), "Total Cost Saved");
        assert_eq!(title_case("file_name"), "File Name");
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(with_thousands(0.0), "0.00");
        assert_eq!(with_thousands(999.5), "999.50");
        assert_eq!(with_thousands(1000.0), "1,000.00");
        assert_eq!(with_thousands(1234567.891), "1,234,567.89");
        assert_eq!(with_thousands(-98765.4), "-98,765.40");
    }

    #[test]
    fn missing_amounts_are_zero() {
        assert_eq!(amount_or_zero(None), "0");
        assert_eq!(amount_or_zero(Some(12.5)), "12.50");
    }

    #[test]
    fn numbers_drop_trailing_zero_fraction() {
        assert_eq!(number(50000.0), "50000");
        assert_eq!(number(12.25), "12.25");
    }
}
