#[cfg(feature = "timing")]
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct TimingStats {
    pub rhs_times: Vec<Duration>,
    pub snapshot_times: Vec<Duration>,
    pub total_time: Duration,
}

impl TimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_rhs(&self) -> Duration {
        self.rhs_times.iter().sum()
    }

    pub fn total_snapshot(&self) -> Duration {
        self.snapshot_times.iter().sum()
    }

    /// Lines for the run summary; empty when nothing was recorded.
    pub fn summary_lines(&self) -> Vec<String> {
        if self.rhs_times.is_empty() {
            return Vec::new();
        }
        let rhs = self.total_rhs();
        let snap = self.total_snapshot();
        let overhead = self.total_time.saturating_sub(rhs + snap);
        let mut lines = vec![
            format!("Total run time:      {:.3}s", self.total_time.as_secs_f64()),
            format!(
                "RHS assembly:        {:>9.3}ms  (avg: {:>9.3}us over {} steps)",
                rhs.as_secs_f64() * 1000.0,
                rhs.as_secs_f64() * 1e6 / self.rhs_times.len() as f64,
                self.rhs_times.len()
            ),
        ];
        if !self.snapshot_times.is_empty() {
            lines.push(format!(
                "Snapshot writes:     {:>9.3}ms  (avg: {:>9.3}ms over {} files)",
                snap.as_secs_f64() * 1000.0,
                snap.as_secs_f64() * 1000.0 / self.snapshot_times.len() as f64,
                self.snapshot_times.len()
            ));
        }
        lines.push(format!(
            "Update/Other:        {:>9.3}ms",
            overhead.as_secs_f64() * 1000.0
        ));
        lines
    }

    #[cfg(feature = "timing")]
    pub fn print_summary(&self) {
        let lines = self.summary_lines();
        if lines.is_empty() {
            return;
        }
        println!("\n{}", "=".repeat(60));
        println!("{:^60}", "INTEGRATOR TIMING SUMMARY");
        println!("{}", "=".repeat(60));
        for line in lines {
            println!("{}", line);
        }
        println!("{}\n", "=".repeat(60));
    }

    #[cfg(not(feature = "timing"))]
    pub fn print_summary(&self) {}
}

#[cfg(feature = "timing")]
thread_local! {
    static TIMING_STATS: RefCell<TimingStats> = RefCell::new(TimingStats::new());
}

#[cfg(feature = "timing")]
pub fn reset_timing() {
    TIMING_STATS.with(|stats| {
        *stats.borrow_mut() = TimingStats::new();
    });
}

#[cfg(not(feature = "timing"))]
pub fn reset_timing() {}

#[cfg(feature = "timing")]
pub fn record_rhs<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| {
        stats.borrow_mut().rhs_times.push(elapsed);
    });
    result
}

#[cfg(not(feature = "timing"))]
#[inline(always)]
pub fn record_rhs<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_snapshot<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| {
        stats.borrow_mut().snapshot_times.push(elapsed);
    });
    result
}

#[cfg(not(feature = "timing"))]
#[inline(always)]
pub fn record_snapshot<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.total_time = total_time;
        s.clone()
    })
}

#[cfg(not(feature = "timing"))]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TimingStats {
        total_time,
        ..TimingStats::default()
    }
}
