//! Worker count selection
//!
//! Every worker drives at most one external encoder at a time, so the pool
//! size is also the bound on concurrent `cjpegli`/`exiftool` processes. One
//! core is left for the coordinator and the rest of the system.

/// `max(1, cpus - 1)`.
pub fn default_worker_count() -> usize {
    worker_count_for(num_cpus::get())
}

/// Clamp a user-supplied worker count; `None` or zero means the default.
pub fn resolve_worker_count(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => default_worker_count(),
    }
}

fn worker_count_for(cpus: usize) -> usize {
    cpus.saturating_sub(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_for() {
        assert_eq!(worker_count_for(0), 1);
        assert_eq!(worker_count_for(1), 1);
        assert_eq!(worker_count_for(2), 1);
        assert_eq!(worker_count_for(8), 7);
    }

    #[test]
    fn test_resolve_worker_count() {
        assert_eq!(resolve_worker_count(Some(3)), 3);
        assert_eq!(resolve_worker_count(Some(0)), default_worker_count());
        assert_eq!(resolve_worker_count(None), default_worker_count());
        assert!(default_worker_count() >= 1);
    }
}
