//! Business rules that do not touch the database.
//!
//! Everything here is a pure function over model types so the repositories and
//! handlers can share it and tests can exercise it without PostgreSQL.

pub mod business_chat;
pub mod call_analysis;
pub mod followup_migration;
pub mod menu;
pub mod pricing;
pub mod task_rules;
pub mod workflow;

/// Rounded amount with `,` thousands grouping, e.g. `150,000`.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.4), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(150000.0), "150,000");
        assert_eq!(format_amount(1234567.6), "1,234,568");
        assert_eq!(format_amount(-25000.0), "-25,000");
    }
}
