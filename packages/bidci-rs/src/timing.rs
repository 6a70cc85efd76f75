use std::time::Instant;

/// Logs how long a pipeline stage took when dropped.
pub struct StageTimer {
    label: String,
    start: Instant,
}

impl StageTimer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        log::debug!("[TIMING] {} - {:.3}ms", self.label, self.elapsed_ms());
    }
}

/// Time the rest of the enclosing scope.
#[macro_export]
macro_rules! time_stage {
    ($label:expr) => {
        let _stage_timer = $crate::timing::StageTimer::new($label);
    };
}
