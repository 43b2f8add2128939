//! Progress snapshots and the human-readable time estimate.

/// Periodic report emitted while a retrieval job runs: results found
/// so far, the current total estimate, and a presentational
/// time-remaining string. Never used for scheduling decisions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProgressSnapshot {
    pub found: usize,
    pub total_estimate: usize,
    pub time_remaining: String,
}

/// Simple transform from seconds to human reading time.
pub fn human_time(seconds: i64) -> String {
    if seconds <= 0 {
        return "Done!".to_string();
    }
    if seconds < 60 {
        return "Less than one minute left".to_string();
    }
    let minutes = (seconds + 30) / 60;
    if minutes < 60 {
        format!("About {} minute{} left", minutes, if minutes != 1 { "s" } else { "" })
    } else {
        let hours = (minutes + 30) / 60;
        format!("About {} hour{} left", hours, if hours != 1 { "s" } else { "" })
    }
}
