/// Logs how long a scope took when dropped.
pub struct LatencyGuard {
    process_name: String,
    start: std::time::Instant,
}

impl LatencyGuard {
    pub fn new<S: Into<String>>(process_name: S) -> Self {
        Self {
            process_name: process_name.into(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::info!(
            "{} took {} us, {} ms",
            self.process_name,
            elapsed.as_micros(),
            elapsed.as_millis()
        );
    }
}
