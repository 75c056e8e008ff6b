//! Upload progress reporting.

/// Receives the upload percentage after every acknowledged section.
///
/// Called synchronously from the upload loop, never from another thread.
/// Any `FnMut(u8)` closure is an observer.
pub trait ProgressObserver {
    /// `percent` is in `0..=100`.
    fn on_progress(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressObserver for F {
    fn on_progress(&mut self, percent: u8) {
        self(percent);
    }
}

/// `min(100, round(100 * next / total))`.
#[allow(clippy::cast_possible_truncation)]
pub fn progress_percent(next_section: u32, section_total: u32) -> u8 {
    if section_total == 0 {
        return 100;
    }
    let next = u64::from(next_section);
    let total = u64::from(section_total);
    // Integer round-half-up of 100 * next / total
    let percent = (200 * next + total) / (2 * total);
    percent.min(100) as u8
}
