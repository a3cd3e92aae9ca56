//! Run one operation over every file of a directory tree on a worker pool.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Job {
    pub source: PathBuf,
    /// Path of `source` relative to the batch root.
    pub rel: PathBuf,
}

impl Job {
    pub fn name(&self) -> String {
        self.rel.to_string_lossy().replace('\\', "/")
    }
}

/// Compare with digit runs ordered by value, so `2` sorts before `10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let take = |it: &mut std::iter::Peekable<std::str::Chars<'_>>| {
                    let mut run = String::new();
                    while let Some(c) = it.next_if(char::is_ascii_digit) {
                        run.push(c);
                    }
                    run
                };
                let (x, y) = (take(&mut a), take(&mut b));
                let (xt, yt) = (x.trim_start_matches('0'), y.trim_start_matches('0'));
                let order = xt
                    .len()
                    .cmp(&yt.len())
                    .then_with(|| xt.cmp(yt))
                    .then_with(|| x.len().cmp(&y.len()));
                if order != Ordering::Equal {
                    return order;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

/// Every regular file under `root` that `keep` accepts, in natural order.
pub fn collect(root: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_file() || !keep(entry.path()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
            .to_path_buf();
        jobs.push(Job {
            source: entry.into_path(),
            rel,
        });
    }
    jobs.sort_by(|a, b| natural_cmp(&a.name(), &b.name()));
    Ok(jobs)
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    /// File name and error chain, in job order.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `work` on every job with `workers` threads. One file failing never
/// stops the others.
pub fn run<F>(jobs: Vec<Job>, workers: usize, work: F) -> BatchReport
where
    F: Fn(&Job) -> Result<()> + Sync,
{
    let total = jobs.len();
    let workers = workers.clamp(1, total.max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, Job)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, String, Result<()>)>();
    for job in jobs.into_iter().enumerate() {
        // The receiver outlives this loop.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    log::debug!("running {total} job(s) on {workers} worker(s)");
    let work = &work;
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for (index, job) in job_rx.iter() {
                    let result = work(&job);
                    if done_tx.send((index, job.name(), result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    let mut results: Vec<_> = done_rx.iter().collect();
    results.sort_by_key(|(index, _, _)| *index);

    let mut report = BatchReport::default();
    for (_, name, result) in results {
        match result {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                log::error!("{name}: {e:#}");
                report.failed.push((name, format!("{e:#}")));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn natural_order() {
        let mut names = vec!["10", "2", "a/1", "01", "1", "b", "a10", "a2"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["1", "01", "2", "10", "a/1", "a2", "a10", "b"]);
    }

    #[test]
    fn collect_filters_and_sorts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("sub"))?;
        for name in ["10", "9", "sub/1", "skip.json"] {
            fs::write(dir.path().join(name), b"x")?;
        }
        let jobs = collect(dir.path(), |p| p.extension().is_none_or(|e| e != "json"))?;
        let names: Vec<String> = jobs.iter().map(Job::name).collect();
        assert_eq!(names, vec!["9", "10", "sub/1"]);
        Ok(())
    }

    #[test]
    fn failures_are_collected_not_fatal() {
        let jobs: Vec<Job> = (0..20)
            .map(|i| Job {
                source: PathBuf::from(i.to_string()),
                rel: PathBuf::from(i.to_string()),
            })
            .collect();
        let seen = AtomicUsize::new(0);
        let report = run(jobs, 4, |job| {
            seen.fetch_add(1, AtomicOrdering::SeqCst);
            if job.name().ends_with('3') {
                bail!("odd one");
            }
            Ok(())
        });
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 20);
        assert_eq!(report.succeeded, 18);
        let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["3", "13"]);
        assert!(!report.is_success());
    }

    #[test]
    fn empty_batch() {
        let report = run(Vec::new(), 8, |_| Ok(()));
        assert_eq!(report.succeeded, 0);
        assert!(report.is_success());
    }
}
