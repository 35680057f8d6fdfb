//! Seat numbering.
//!
//! The n-th seat of a flight (1-based) sits in row `(n - 1) / 6` and column
//! `(n - 1) % 6 + 1`. Rows are lettered `A..Z`, then `AA, AB, ..` so a label
//! exists for every capacity. Seat 1 is `A1`, seat 7 is `B1`.

/// Seats per cabin row.
pub const SEATS_PER_ROW: u32 = 6;

/// Label of the seat at 1-based `index`. Returns `None` for index 0.
pub fn seat_label(index: u32) -> Option<String> {
    if index == 0 {
        return None;
    }

    let column = (index - 1) % SEATS_PER_ROW + 1;
    let mut row = (index - 1) / SEATS_PER_ROW + 1;

    let mut letters = Vec::new();
    while row > 0 {
        row -= 1;
        letters.push((b'A' + (row % 26) as u8) as char);
        row /= 26;
    }

    let mut label: String = letters.iter().rev().collect();
    label.push_str(&column.to_string());
    Some(label)
}

/// 1-based index of a seat label, accepting lower case input.
pub fn seat_index(label: &str) -> Option<u32> {
    let label = label.trim();
    let split = label.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = label.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let column: u32 = digits.parse().ok()?;
    if column == 0 || column > SEATS_PER_ROW {
        return None;
    }

    let mut row: u32 = 0;
    for c in letters.chars() {
        let value = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        row = row.checked_mul(26)?.checked_add(value)?;
    }

    (row - 1)
        .checked_mul(SEATS_PER_ROW)?
        .checked_add(column)
}

/// All seat labels of a flight with the given capacity, in cabin order.
pub fn labels(capacity: u32) -> impl Iterator<Item = String> {
    (1..=capacity).filter_map(seat_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_rows() {
        let first: Vec<String> = labels(8).collect();
        assert_eq!(first, vec!["A1", "A2", "A3", "A4", "A5", "A6", "B1", "B2"]);
    }

    #[test]
    fn test_rows_past_z() {
        // 26 rows of six seats, the next seat opens row AA
        assert_eq!(seat_label(156).as_deref(), Some("Z6"));
        assert_eq!(seat_label(157).as_deref(), Some("AA1"));
        assert_eq!(seat_index("AA1"), Some(157));
        assert_eq!(seat_index("AB3"), Some(165));
    }

    #[test]
    fn test_index_matches_label() {
        for index in [1, 6, 7, 150, 156, 157, 1000, 4057] {
            let label = seat_label(index).unwrap();
            assert_eq!(seat_index(&label), Some(index), "label {}", label);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(seat_label(0), None);
        assert_eq!(seat_index(""), None);
        assert_eq!(seat_index("A"), None);
        assert_eq!(seat_index("1A"), None);
        assert_eq!(seat_index("A0"), None);
        assert_eq!(seat_index("A7"), None);
        assert_eq!(seat_index("A1B"), None);
        assert_eq!(seat_index("Ä1"), None);
    }
}
