//! The fixed D8 flow-direction encoding (§6): 1=E, 2=SE, 4=S, 8=SW, 16=W,
//! 32=NW, 64=N, 128=NE. Any other value, including NoData, is a boundary.
//!
//! Builds a `(row_offset, col_offset)` table indexed directly by pointer
//! value, rather than a branching match, so direction lookup is a single
//! array read (see DESIGN.md for the value-assignment rationale).

/// The 8 valid D8 pointer values, in the order E, SE, S, SW, W, NW, N, NE.
pub const POINTER_VALUES: [i32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// `(row_offset, col_offset)` for each entry of `POINTER_VALUES`.
pub const OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // E
    (1, 1),   // SE
    (1, 0),   // S
    (1, -1),  // SW
    (0, -1),  // W
    (-1, -1), // NW
    (-1, 0),  // N
    (-1, 1),  // NE
];

/// Maps a pointer value to its offset-table index, or `None` if the value
/// is not one of the 8 valid D8 codes (a boundary).
pub fn direction_index(value: f64) -> Option<usize> {
    if value.fract() != 0.0 {
        return None;
    }
    let v = value as i32;
    POINTER_VALUES.iter().position(|&p| p == v)
}

/// Returns the (row, col) of the single downstream neighbour of `(row,
/// col)` under flow-direction value `value`, or `None` if `value` is a
/// boundary code.
pub fn downstream_of(row: isize, col: isize, value: f64) -> Option<(isize, isize)> {
    let idx = direction_index(value)?;
    let (dr, dc) = OFFSETS[idx];
    Some((row + dr, col + dc))
}

/// Returns true if a pixel with flow-direction value `from_value` located
/// at `(from_row, from_col)` flows directly into `(to_row, to_col)`.
pub fn flows_into(from_row: isize, from_col: isize, from_value: f64, to_row: isize, to_col: isize) -> bool {
    match downstream_of(from_row, from_col, from_value) {
        Some((r, c)) => r == to_row && c == to_col,
        None => false,
    }
}

/// True for a cardinal (non-diagonal) direction code.
pub fn is_cardinal(value: f64) -> bool {
    matches!(value as i32, 1 | 4 | 16 | 64)
}
