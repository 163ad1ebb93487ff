//! DDRAM layout of HD44780 displays.
//!
//! The controller has two 40-cell banks, at `0x00` and `0x40`. Rows 0 and 1 start at the bank
//! bases; on 4-line displays rows 2 and 3 continue rows 0 and 1 inside the same banks, right
//! after the visible columns.

/// DDRAM base address of the second controller line.
pub const SECOND_LINE_BASE: u8 = 0x40;

/// Gets the DDRAM address of the cell at `(row, col)` on a display with `columns` columns.
///
/// `col == columns` is accepted and yields the address just past the row, which is where the
/// cursor sits after the last cell was written.
pub fn address_for(row: u8, col: u8, columns: u8) -> u8 {
    let mut address = col;
    if row % 2 == 1 {
        address += SECOND_LINE_BASE;
    }
    if row >= 2 {
        address += columns;
    }
    address
}
