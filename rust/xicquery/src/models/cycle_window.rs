use serde::{
    Deserialize,
    Serialize,
};

/// Range of consecutive cycles a query is extracted over.
///
/// Always fully inside `[0, total_cycles)`: the width is capped at the total
/// and the start is clamped to `[0, total_cycles - width]`.
///
/// ```
/// use xicquery::CycleWindow;
///
/// let window = CycleWindow::centered(1, 7, 100);
/// assert_eq!(window.start(), 0);
/// assert_eq!(window.end(), 7);
///
/// let window = CycleWindow::centered(98, 7, 100);
/// assert_eq!(window.start(), 93);
/// assert_eq!(window.end(), 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    start: usize,
    width: usize,
}

impl CycleWindow {
    /// Clamps a requested (possibly negative) start.
    pub fn clamped(requested_start: i64, width: usize, total_cycles: usize) -> Self {
        let width = width.min(total_cycles);
        let max_start = (total_cycles - width) as i64;
        let start = requested_start.clamp(0, max_start) as usize;
        Self { start, width }
    }

    /// Window of `width` cycles with `center` at offset `width / 2`, when not clamped.
    pub fn centered(center: usize, width: usize, total_cycles: usize) -> Self {
        Self::clamped(center as i64 - (width / 2) as i64, width, total_cycles)
    }

    /// Window covering `predicted_rt ± rt_tolerance`.
    ///
    /// The width is the tolerance span divided by the mean cycle time, the
    /// start is the lower bound mapped linearly onto the cycle indices.
    pub fn from_rt_tolerance(predicted_rt: f32, rt_tolerance: f32, cycle_rts: &[f32]) -> Self {
        let total = cycle_rts.len();
        if total < 2 {
            return Self::full(total);
        }
        let last_rt = cycle_rts[total - 1];
        let cycle_time = (last_rt - cycle_rts[0]) / (total - 1) as f32;
        let width = if cycle_time > 0.0 {
            (2.0 * rt_tolerance / cycle_time) as usize
        } else {
            total
        };
        let start = ((predicted_rt - rt_tolerance) / last_rt * (total - 1) as f32) as i64;
        Self::clamped(start, width, total)
    }

    pub fn full(total_cycles: usize) -> Self {
        Self {
            start: 0,
            width: total_cycles,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn end(&self) -> usize {
        self.start + self.width
    }

    pub fn cycles(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_windows_stay_in_range() {
        for total in [1usize, 5, 13, 50] {
            for width in [1usize, 3, 7, 13, 60] {
                for requested in -80i64..80 {
                    let window = CycleWindow::clamped(requested, width, total);
                    assert!(window.end() <= total);
                    assert_eq!(window.width(), width.min(total));
                    if requested >= 0 && (requested as usize) + width.min(total) <= total {
                        assert_eq!(window.start(), requested as usize);
                    }
                }
            }
        }
    }

    #[test]
    fn test_width_larger_than_run() {
        let window = CycleWindow::centered(3, 13, 5);
        assert_eq!(window.start(), 0);
        assert_eq!(window.width(), 5);
    }

    #[test]
    fn test_rt_tolerance_window() {
        let rts: Vec<f32> = (0..101).map(|x| x as f32).collect();
        let window = CycleWindow::from_rt_tolerance(54.0, 4.0, &rts);
        assert_eq!(window.width(), 8);
        assert_eq!(window.start(), 50);

        let early = CycleWindow::from_rt_tolerance(1.0, 5.0, &rts);
        assert_eq!(early.start(), 0);
    }

    #[test]
    fn test_full_and_empty() {
        assert_eq!(CycleWindow::full(7).cycles(), 0..7);
        let empty = CycleWindow::from_rt_tolerance(1.0, 1.0, &[]);
        assert_eq!(empty.width(), 0);
    }
}
