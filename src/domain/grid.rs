//! Exposure parameter grid
//!
//! Rows step the analog gain linearly, columns step the shutter on a log
//! scale. Cells are emitted row-major, which is the order the compositor
//! places them in.

use crate::domain::error::GridError;
use crate::domain::models::{
    GridCell, GAIN_MAX, SHUTTER_AXIS_MAX, SHUTTER_CLAMP_MAX, SHUTTER_MIN,
};

/// Largest grid whose rounded shutter steps are still strictly increasing
pub const MAX_GRID_SIZE: u32 = 52;

/// Generate the `size × size` sweep grid in row-major order
pub fn generate(size: u32) -> Result<Vec<GridCell>, GridError> {
    if size < 2 {
        return Err(GridError::SizeTooSmall(size));
    }
    if size > MAX_GRID_SIZE {
        return Err(GridError::SizeTooLarge {
            size,
            max: MAX_GRID_SIZE,
        });
    }

    let shutters: Vec<u32> = (0..size).map(|col| shutter_for_column(col, size)).collect();

    let cells = (0..size)
        .flat_map(|row| {
            let gain = row * GAIN_MAX / (size - 1);
            shutters.iter().enumerate().map(move |(col, &shutter)| GridCell {
                row,
                col: col as u32,
                gain,
                shutter,
            })
        })
        .collect();

    Ok(cells)
}

fn shutter_for_column(col: u32, size: u32) -> u32 {
    let log_min = (SHUTTER_MIN as f64).ln();
    let log_max = (SHUTTER_AXIS_MAX as f64).ln();
    let log_shutter = log_min + col as f64 * (log_max - log_min) / (size - 1) as f64;

    (log_shutter.exp().round() as u32).clamp(SHUTTER_MIN, SHUTTER_CLAMP_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_sizes() {
        assert_eq!(generate(0), Err(GridError::SizeTooSmall(0)));
        assert_eq!(generate(1), Err(GridError::SizeTooSmall(1)));
    }

    #[test]
    fn test_rejects_oversized_grids() {
        for size in [MAX_GRID_SIZE + 1, 71, 65536, u32::MAX] {
            assert_eq!(
                generate(size),
                Err(GridError::SizeTooLarge {
                    size,
                    max: MAX_GRID_SIZE
                })
            );
        }
        assert_eq!(generate(MAX_GRID_SIZE).unwrap().len(), 52 * 52);
    }

    #[test]
    fn test_index_does_not_overflow() {
        let cell = GridCell {
            row: 70_000,
            col: 3,
            gain: 0,
            shutter: SHUTTER_MIN,
        };
        assert_eq!(cell.index(70_000), 70_000usize * 70_000 + 3);
    }

    #[test]
    fn test_grid_is_row_major_and_monotonic() {
        for size in 2..=MAX_GRID_SIZE {
            let cells = generate(size).unwrap();
            assert_eq!(cells.len(), (size * size) as usize);

            for (i, cell) in cells.iter().enumerate() {
                assert_eq!(cell.index(size), i);
                assert!(cell.gain <= GAIN_MAX);
                assert!((SHUTTER_MIN..=SHUTTER_CLAMP_MAX).contains(&cell.shutter));
            }

            for row in cells.chunks(size as usize) {
                assert!(row.windows(2).all(|w| w[0].shutter < w[1].shutter));
                assert!(row.iter().all(|c| c.gain == row[0].gain));
            }

            let gains: Vec<u32> = cells.iter().step_by(size as usize).map(|c| c.gain).collect();
            assert!(gains.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(gains[0], 0);
            assert_eq!(*gains.last().unwrap(), GAIN_MAX);
        }
    }

    #[test]
    fn test_log_spacing_endpoints() {
        let cells = generate(5).unwrap();
        assert_eq!(cells[0].shutter, 4);
        assert_eq!(cells[4].shutter, 16343);
        // Geometric midpoint of 4 and 16383, not the arithmetic one
        assert_eq!(cells[2].shutter, 256);
    }

    #[test]
    fn test_gain_uses_integer_division() {
        let gains: Vec<u32> = generate(4)
            .unwrap()
            .iter()
            .filter(|c| c.col == 0)
            .map(|c| c.gain)
            .collect();
        assert_eq!(gains, vec![0, 82, 165, 248]);
    }
}
