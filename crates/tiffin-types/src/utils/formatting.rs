//! String formatting utilities.

/// Truncates an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Normalizes a free-text place name for comparison.
///
/// Lowercases and collapses runs of whitespace so "New  Delhi " and
/// "new delhi" compare equal.
pub fn normalize_place(place: &str) -> String {
	place
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789abc"), "12345678..");
	}

	#[test]
	fn test_normalize_place() {
		assert_eq!(normalize_place("  New   Delhi "), "new delhi");
		assert_eq!(normalize_place(""), "");
	}
}
