//! String and number formatting for logs and reports.

/// Truncates an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Rounds a value to the given number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
	let factor = 10f64.powi(decimals as i32);
	(value * factor).round() / factor
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
		assert_eq!(
			truncate_id("3f2b8c1e-6a4d-4c9b-9a71-0e5d2f7b8c90"),
			"3f2b8c1e.."
		);
	}

	#[test]
	fn test_round_to() {
		assert_eq!(round_to(66.666_666, 1), 66.7);
		assert_eq!(round_to(50.0, 1), 50.0);
	}
}
