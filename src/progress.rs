//! Progress reporting for long pixel passes and export packaging.
//!
//! The pipeline only ever talks to a [`ProgressSink`]; the CLI plugs in a
//! console bar, tests plug in a recorder, and everything else stays unaware
//! of how (or whether) progress is displayed.

/// Receives progress updates: a percentage in `[0, 100]` plus a
/// human-readable stage label.
pub trait ProgressSink {
    fn update(&mut self, percent: f64, message: &str);
}

/// Discards every update.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&mut self, _percent: f64, _message: &str) {}
}

/// Prints one line per whole-percent advance (or message change) so batch
/// logs stay readable.
#[derive(Default)]
pub struct ConsoleSink {
    last_whole: Option<i64>,
    last_message: String,
}

impl ProgressSink for ConsoleSink {
    fn update(&mut self, percent: f64, message: &str) {
        let whole = percent.floor() as i64;
        if self.last_whole == Some(whole) && self.last_message == message {
            return;
        }
        self.last_whole = Some(whole);
        self.last_message = message.to_string();
        println!("  [{:3}%] {}", whole, message);
    }
}

/// Wraps a sink and guarantees the reported percentage is clamped to
/// `[0, 100]` and never decreases for the lifetime of one run.
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    last: f64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0.0 }
    }

    pub fn report(&mut self, percent: f64, message: &str) {
        let clamped = percent.clamp(0.0, 100.0).max(self.last);
        self.last = clamped;
        self.sink.update(clamped, message);
    }

    /// Report a fraction `[0, 1]` mapped into the window `[lo, hi]`.
    pub fn report_window(&mut self, lo: f64, hi: f64, fraction: f64, message: &str) {
        let span = (hi - lo).max(0.0);
        self.report(lo + span * fraction.clamp(0.0, 1.0), message);
    }

    pub fn finish(&mut self, message: &str) {
        self.report(100.0, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<f64>);

    impl ProgressSink for Recorder {
        fn update(&mut self, percent: f64, _message: &str) {
            self.0.push(percent);
        }
    }

    #[test]
    fn reports_never_decrease() {
        let mut rec = Recorder(Vec::new());
        let mut progress = ProgressReporter::new(&mut rec);
        progress.report(10.0, "a");
        progress.report(5.0, "b");
        progress.report(60.0, "c");
        progress.report(30.0, "d");
        assert_eq!(rec.0, vec![10.0, 10.0, 60.0, 60.0]);
    }

    #[test]
    fn reports_clamp_to_bounds() {
        let mut rec = Recorder(Vec::new());
        let mut progress = ProgressReporter::new(&mut rec);
        progress.report(-5.0, "a");
        progress.report(250.0, "b");
        assert_eq!(rec.0, vec![0.0, 100.0]);
    }

    #[test]
    fn window_maps_fractions() {
        let mut rec = Recorder(Vec::new());
        let mut progress = ProgressReporter::new(&mut rec);
        progress.report_window(10.0, 80.0, 0.5, "halfway");
        assert_eq!(rec.0, vec![45.0]);
    }
}
