//! File-backed session log

use beckon_api::LogTag;
use beckon_util::{MonotonicInstant, SessionId};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{ElapsedClock, LogEntry, LogError, LogResult, SessionLog};

struct OpenFile {
    session_id: SessionId,
    path: PathBuf,
    writer: BufWriter<File>,
    clock: ElapsedClock,
}

/// Writes each session to its own file under a directory
pub struct FileSessionLog {
    dir: PathBuf,
    current: Mutex<Option<OpenFile>>,
}

impl FileSessionLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            current: Mutex::new(None),
        }
    }

    /// Path of the file for the open session, if any
    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|f| f.path.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenFile>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First free path for a session starting at `started_at`
    fn next_free_path(&self, started_at: &DateTime<Local>) -> PathBuf {
        let stem = log_file_stem(started_at);
        let mut path = self.dir.join(format!("{}_log.txt", stem));
        let mut n = 2;
        while path.exists() {
            path = self.dir.join(format!("{}-{}_log.txt", stem, n));
            n += 1;
        }
        path
    }
}

/// File name stem derived from the session start time, e.g. `2014_4_2_093015`
pub fn log_file_stem(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y_%-m_%-d_%H%M%S").to_string()
}

fn finish(mut file: OpenFile) -> LogResult<()> {
    file.writer.flush()?;
    debug!(session_id = %file.session_id, path = %file.path.display(), "Session log closed");
    Ok(())
}

impl SessionLog for FileSessionLog {
    fn open(
        &self,
        session_id: &SessionId,
        started_at: DateTime<Local>,
        started_at_mono: MonotonicInstant,
    ) -> LogResult<()> {
        let mut current = self.lock();

        if let Some(stale) = current.take() {
            warn!(session_id = %stale.session_id, "Closing session log left open");
            if let Err(e) = finish(stale) {
                warn!(error = %e, "Failed to flush stale session log");
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.next_free_path(&started_at);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        info!(session_id = %session_id, path = %path.display(), "Session log opened");

        *current = Some(OpenFile {
            session_id: session_id.clone(),
            path,
            writer: BufWriter::new(file),
            clock: ElapsedClock::new(started_at_mono),
        });
        Ok(())
    }

    fn append(&self, tag: LogTag, value: i64, now: MonotonicInstant) -> LogResult<LogEntry> {
        let mut current = self.lock();
        let file = current.as_mut().ok_or(LogError::NotOpen)?;

        let entry = LogEntry::new(tag, value, file.clock.elapsed_at(now));
        file.writer.write_all(entry.to_line().as_bytes())?;
        // Keep the file readable while the session runs
        file.writer.flush()?;
        Ok(entry)
    }

    fn close(&self) -> LogResult<()> {
        match self.lock().take() {
            Some(file) => finish(file),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.lock().is_some()
    }
}

impl Drop for FileSessionLog {
    fn drop(&mut self) {
        if let Some(file) = self.lock().take()
            && let Err(e) = finish(file)
        {
            warn!(error = %e, "Failed to flush session log on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_log;
    use chrono::TimeZone;
    use std::time::Duration;

    fn started() -> (DateTime<Local>, MonotonicInstant) {
        (
            Local.with_ymd_and_hms(2014, 4, 2, 9, 30, 15).unwrap(),
            MonotonicInstant::now(),
        )
    }

    #[test]
    fn file_name_from_start_time() {
        let (at, _) = started();
        assert_eq!(log_file_stem(&at), "2014_4_2_093015");
    }

    #[test]
    fn writes_tab_separated_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileSessionLog::new(dir.path().join("logs"));
        let (at, mono) = started();

        log.open(&SessionId::new(), at, mono).unwrap();
        let path = log.current_path().unwrap();
        log.append(LogTag::CallStarted, 1, mono + Duration::from_secs(5))
            .unwrap();
        log.append(LogTag::CallEnded, 1, mono + Duration::from_millis(5200))
            .unwrap();
        log.close().unwrap();

        assert!(!log.is_open());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "CS\t1\t5.000\nCE\t1\t5.200\n");

        let entries = read_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].tag, LogTag::CallEnded);
    }

    #[test]
    fn append_without_open_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileSessionLog::new(dir.path());

        let result = log.append(LogTag::FaceDetected, 1, MonotonicInstant::now());
        assert!(matches!(result, Err(LogError::NotOpen)));
        assert!(log.close().is_ok());
    }

    #[test]
    fn sessions_in_the_same_second_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileSessionLog::new(dir.path());
        let (at, mono) = started();

        log.open(&SessionId::new(), at, mono).unwrap();
        let first = log.current_path().unwrap();
        log.close().unwrap();

        log.open(&SessionId::new(), at, mono).unwrap();
        let second = log.current_path().unwrap();
        log.close().unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-2_log.txt"));
    }

    #[test]
    fn reopening_closes_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileSessionLog::new(dir.path());
        let (at, mono) = started();

        log.open(&SessionId::new(), at, mono).unwrap();
        let first = log.current_path().unwrap();
        log.append(LogTag::FaceDetected, 1, mono).unwrap();

        log.open(&SessionId::new(), at + chrono::Duration::minutes(1), mono)
            .unwrap();
        assert_ne!(log.current_path().unwrap(), first);
        assert_eq!(read_log(&first).unwrap().len(), 1);
    }
}
