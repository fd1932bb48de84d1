use std::time::{Duration, Instant};

/// Session timing and ETA for the operator's status lines.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: usize,
    done_at_start: usize,
    previous: Duration,
    started: Instant,
}

impl Progress {
    /// `done` chunks were completed and `previous` time spent in earlier
    /// sessions.
    pub fn new(total: usize, done: usize, previous: Duration) -> Self {
        Self {
            total,
            done,
            done_at_start: done,
            previous,
            started: Instant::now(),
        }
    }

    pub fn chunk_done(&mut self) {
        self.done = (self.done + 1).min(self.total);
    }

    pub fn session(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time across all sessions.
    pub fn total_time(&self) -> Duration {
        self.previous + self.session()
    }

    /// Remaining time extrapolated from this session's pace.
    pub fn eta(&self) -> Option<Duration> {
        eta(
            self.session(),
            self.done - self.done_at_start,
            self.total - self.done,
        )
    }

    pub fn status_line(&self, finished_index: usize) -> String {
        let eta = match self.eta() {
            Some(d) => format_duration(d),
            None if self.done == self.total => "complete".into(),
            None => "calculating...".into(),
        };
        format!(
            "Chunk {}/{} done ({}/{} complete) | Session: {} | Total: {} | ETA: {}",
            finished_index + 1,
            self.total,
            self.done,
            self.total,
            format_duration(self.session()),
            format_duration(self.total_time()),
            eta
        )
    }
}

fn eta(elapsed: Duration, finished: usize, remaining: usize) -> Option<Duration> {
    if finished == 0 || remaining == 0 {
        return None;
    }
    let per_chunk = elapsed.as_secs_f64() / finished as f64;
    Some(Duration::from_secs_f64(per_chunk * remaining as f64))
}

/// `42s`, `3m 5s` or `2h 7m`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
