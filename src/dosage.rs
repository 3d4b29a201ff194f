/// Normalise a dosage unit for storage and display.
///
/// Lowercases and maps known aliases ("Tablette", "tablet") to a single
/// spelling. Unknown units pass through lowercased; blank input is returned
/// as given.
pub fn normalize_dosage_unit(unit: &str) -> String {
    let normalized = unit.trim().to_lowercase();
    if normalized.is_empty() {
        return unit.to_string();
    }

    match normalized.as_str() {
        "g" | "gram" | "grams" => "g".to_string(),
        "mg" => "mg".to_string(),
        "ml" => "ml".to_string(),
        "tablet" | "tablets" | "tablette" | "tabletten" => "tablets".to_string(),
        _ => normalized,
    }
}

/// Render an amount and unit, e.g. "500 mg" or "1.5 ml".
pub fn format_dosage(amount: f64, unit: &str) -> String {
    let unit = normalize_dosage_unit(unit);
    let amount = if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{}", amount)
    };

    if unit.trim().is_empty() {
        amount
    } else {
        format!("{} {}", amount, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_units() {
        assert_eq!(normalize_dosage_unit("mg"), "mg");
        assert_eq!(normalize_dosage_unit(" MG "), "mg");
        assert_eq!(normalize_dosage_unit("Tablette"), "tablets");
        assert_eq!(normalize_dosage_unit("tabletten"), "tablets");
        assert_eq!(normalize_dosage_unit("tablet"), "tablets");
        assert_eq!(normalize_dosage_unit("Drops"), "drops");
        assert_eq!(normalize_dosage_unit(""), "");
        assert_eq!(normalize_dosage_unit("  "), "  ");
    }

    #[test]
    fn test_format_dosage() {
        assert_eq!(format_dosage(500.0, "mg"), "500 mg");
        assert_eq!(format_dosage(1.5, "ML"), "1.5 ml");
        assert_eq!(format_dosage(2.0, "Tabletten"), "2 tablets");
        assert_eq!(format_dosage(1.0, ""), "1");
    }
}
