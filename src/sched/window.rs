//! Rolling-window bookkeeping.
//!
//! Pure index math, deliberately free of clocks and graphs: given where the
//! play head is, which loop iterations still need commands issued?

/// Loop iteration containing `beat` for a loop of `loop_beats` beats.
///
/// Floor division, so beats before zero land in negative loop indices, so the
/// backward extrapolation the clock supports maps cleanly onto the window.
pub fn loop_index(beat: f64, loop_beats: f64) -> i64 {
    (beat / loop_beats).floor() as i64
}

/// Tracks the most advanced loop iteration already committed.
///
/// `highest_scheduled` only ever moves forward; a loop index is handed out
/// exactly once across any sequence of `due` calls.
#[derive(Debug, Clone)]
pub struct LoopWindow {
    highest_scheduled: i64,
}

impl LoopWindow {
    /// A window with nothing yet scheduled for `loop_index` or beyond.
    pub fn starting_at(loop_index: i64) -> Self {
        Self {
            highest_scheduled: loop_index - 1,
        }
    }

    /// The most advanced loop iteration commands have been issued for.
    pub fn highest_scheduled(&self) -> i64 {
        self.highest_scheduled
    }

    /// Loop indices that need commands so that `lookahead` loops, counting
    /// the current one, are covered. Advances the high-water mark; may be
    /// empty when the window is already topped up.
    pub fn due(&mut self, current_loop: i64, lookahead: i64) -> std::ops::Range<i64> {
        let target = current_loop + lookahead - 1;
        let first = self.highest_scheduled + 1;
        if target > self.highest_scheduled {
            self.highest_scheduled = target;
        }
        first..target + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_index_floors() {
        assert_eq!(loop_index(0.0, 4.0), 0);
        assert_eq!(loop_index(3.999, 4.0), 0);
        assert_eq!(loop_index(4.0, 4.0), 1);
        assert_eq!(loop_index(-0.5, 4.0), -1);
    }

    #[test]
    fn initial_window_covers_lookahead() {
        let mut window = LoopWindow::starting_at(0);
        let due: Vec<i64> = window.due(0, 2).collect();
        assert_eq!(due, vec![0, 1]);
        assert_eq!(window.highest_scheduled(), 1);
    }

    #[test]
    fn repeated_passes_do_not_reemit() {
        let mut window = LoopWindow::starting_at(0);
        assert_eq!(window.due(0, 2).count(), 2);
        // Same position, nothing new.
        assert_eq!(window.due(0, 2).count(), 0);
        assert_eq!(window.highest_scheduled(), 1);
        // One loop later, exactly one new index.
        let due: Vec<i64> = window.due(1, 2).collect();
        assert_eq!(due, vec![2]);
    }

    #[test]
    fn high_water_mark_is_non_decreasing() {
        let mut window = LoopWindow::starting_at(5);
        window.due(5, 2);
        let high = window.highest_scheduled();
        // A pass computed from an earlier position (clock queried slightly in
        // the past) cannot roll the mark back.
        assert_eq!(window.due(4, 2).count(), 0);
        assert_eq!(window.highest_scheduled(), high);
    }

    #[test]
    fn catches_up_after_a_long_stall() {
        let mut window = LoopWindow::starting_at(0);
        window.due(0, 2);
        // Play head jumped to loop 5 while we were asleep: every missed index
        // comes out exactly once.
        let due: Vec<i64> = window.due(5, 2).collect();
        assert_eq!(due, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn negative_loops_supported() {
        let mut window = LoopWindow::starting_at(-2);
        let due: Vec<i64> = window.due(-2, 2).collect();
        assert_eq!(due, vec![-2, -1]);
    }
}
