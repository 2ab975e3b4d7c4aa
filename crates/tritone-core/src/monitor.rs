//! Monitor mode: slide a fixed window with overlap across a long query and
//! dispatch one independent sub-query per window.

/// One sub-query window, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorWindow {
    pub start_s: f64,
    pub stop_s: f64,
}

impl MonitorWindow {
    pub fn len_s(&self) -> f64 {
        self.stop_s - self.start_s
    }

    /// Label for the sub-query, distinguishing it from a whole-file query.
    pub fn label(&self, query_path: &str) -> String {
        format!("{}-{}_{}", query_path, self.start_s, self.stop_s)
    }
}

/// Windows `[t, t + step)` for `t = 0, step - overlap, 2(step - overlap), ...`
/// while `t + step < duration`. No state flows between windows.
pub fn windows(duration_s: f64, step_s: u32, overlap_s: u32) -> Vec<MonitorWindow> {
    let step = step_s as f64;
    let advance = (step_s - overlap_s) as f64;
    let mut out = Vec::new();
    let mut t = 0.0;
    while t + step < duration_s {
        out.push(MonitorWindow {
            start_s: t,
            stop_s: t + step,
        });
        t += advance;
    }
    out
}
