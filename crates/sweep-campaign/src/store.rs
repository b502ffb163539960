use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use sweep_core::errors::{ErrorInfo, SweepError};
use sweep_core::StoreKind;
use tracing::{error, warn};

use crate::index::RunRecord;
use crate::serde::{from_json_slice, to_canonical_json_bytes, to_json_line};

/// Durable append-only backend of a [`crate::RunIndex`].
#[derive(Debug)]
pub enum RunStore {
    /// One canonical JSON record per line, fsynced after every append.
    Jsonl {
        /// Location of `runs.jsonl`.
        path: PathBuf,
        /// Handle opened in append mode.
        file: File,
    },
    /// SQLite table `runs`, one committed row per record.
    Sqlite {
        /// Location of `runs.sqlite`.
        path: PathBuf,
        /// Open connection.
        conn: Connection,
    },
}

impl RunStore {
    /// Opens (creating when absent) the store of `kind` inside `dir`.
    pub fn open(dir: &Path, kind: StoreKind) -> Result<Self, SweepError> {
        let path = dir.join(kind.file_name());
        match kind {
            StoreKind::Jsonl => {
                let file = OpenOptions::new()
                    .read(true)
                    .append(true)
                    .create(true)
                    .open(&path)
                    .map_err(|err| storage_error("store-open", &path, err))?;
                Ok(RunStore::Jsonl { path, file })
            }
            StoreKind::Sqlite => {
                let conn =
                    Connection::open(&path).map_err(|err| storage_error("store-open", &path, err))?;
                conn.execute_batch(
                    r#"CREATE TABLE IF NOT EXISTS runs (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        fingerprint TEXT NOT NULL,
                        repetition INTEGER NOT NULL,
                        status TEXT NOT NULL,
                        attempt INTEGER NOT NULL,
                        record TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS runs_key ON runs (fingerprint, repetition);"#,
                )
                .map_err(|err| storage_error("store-schema", &path, err))?;
                Ok(RunStore::Sqlite { path, conn })
            }
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        match self {
            RunStore::Jsonl { path, .. } | RunStore::Sqlite { path, .. } => path,
        }
    }

    /// Reads every persisted record in append order.
    pub fn load(&mut self) -> Result<Vec<RunRecord>, SweepError> {
        match self {
            RunStore::Jsonl { path, file } => load_jsonl(path, file),
            RunStore::Sqlite { path, conn } => load_sqlite(path, conn),
        }
    }

    /// Durably appends one record. Returns only after the write is on disk.
    ///
    /// A failed JSON-lines append is rolled back so the file never holds a
    /// partial record in front of later ones.
    pub fn append(&mut self, record: &RunRecord) -> Result<(), SweepError> {
        match self {
            RunStore::Jsonl { path, file } => append_jsonl(path, file, record),
            RunStore::Sqlite { path, conn } => append_sqlite(path, conn, record),
        }
    }
}

fn load_jsonl(path: &Path, file: &mut File) -> Result<Vec<RunRecord>, SweepError> {
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut contents))
        .map_err(|err| storage_error("store-read", path, err))?;

    // A crash mid-append leaves a final line without its newline. Only that
    // in-flight record is lost; cut it off so later appends start clean.
    let complete_len = match contents.iter().rposition(|byte| *byte == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    };
    if complete_len < contents.len() {
        warn!(
            path = %path.display(),
            bytes = contents.len() - complete_len,
            "discarding torn trailing record"
        );
        truncate(file, complete_len as u64)
            .map_err(|err| storage_error("store-truncate", path, err))?;
        contents.truncate(complete_len);
    }

    let mut records = Vec::new();
    for (line_no, line) in contents.split(|byte| *byte == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record: RunRecord = from_json_slice(line).map_err(|err| {
            SweepError::Storage(
                ErrorInfo::new("store-corrupt", "run record is not valid JSON")
                    .with_path(path)
                    .with_context("line", (line_no + 1).to_string())
                    .with_hint(err.info().message.clone()),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

fn append_jsonl(path: &Path, file: &mut File, record: &RunRecord) -> Result<(), SweepError> {
    let line = to_json_line(record)?;
    let len = file
        .metadata()
        .map_err(|err| storage_error("store-stat", path, err))?
        .len();
    let start = complete_prefix_len(file, len).map_err(|err| storage_error("store-read", path, err))?;
    if start < len {
        warn!(
            path = %path.display(),
            bytes = len - start,
            "discarding partial record left by an earlier failed append"
        );
        truncate(file, start).map_err(|err| storage_error("store-truncate", path, err))?;
    }

    let written = file
        .write_all(&line)
        .and_then(|_| file.flush())
        .and_then(|_| file.sync_data());
    if let Err(err) = written {
        // Earlier records must stay loadable: drop whatever part of this one landed.
        if let Err(rollback) = truncate(file, start) {
            error!(path = %path.display(), error = %rollback, "could not roll back partial record");
        }
        return Err(storage_error("store-append", path, err));
    }
    Ok(())
}

/// Length of the file up to and including its last newline.
fn complete_prefix_len(file: &mut File, len: u64) -> io::Result<u64> {
    let mut buf = [0u8; 4096];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|byte| *byte == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

fn truncate(file: &mut File, len: u64) -> io::Result<()> {
    file.set_len(len)?;
    file.sync_data()
}

fn load_sqlite(path: &Path, conn: &mut Connection) -> Result<Vec<RunRecord>, SweepError> {
    let mut stmt = conn
        .prepare("SELECT seq, record FROM runs ORDER BY seq")
        .map_err(|err| storage_error("store-prepare", path, err))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
        .map_err(|err| storage_error("store-query", path, err))?;
    let mut records = Vec::new();
    for row in rows {
        let (seq, text) = row.map_err(|err| storage_error("store-row", path, err))?;
        let record: RunRecord = from_json_slice(text.as_bytes()).map_err(|err| {
            SweepError::Storage(
                ErrorInfo::new("store-corrupt", "run record is not valid JSON")
                    .with_path(path)
                    .with_context("seq", seq.to_string())
                    .with_hint(err.info().message.clone()),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

fn append_sqlite(path: &Path, conn: &mut Connection, record: &RunRecord) -> Result<(), SweepError> {
    let payload = String::from_utf8(to_canonical_json_bytes(record)?)
        .map_err(|err| storage_error("store-encode", path, err))?;
    let tx = conn
        .transaction()
        .map_err(|err| storage_error("store-transaction", path, err))?;
    tx.execute(
        "INSERT INTO runs (fingerprint, repetition, status, attempt, record)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            &record.key.fingerprint,
            record.key.repetition as i64,
            record.status.as_str(),
            record.attempt as i64,
            payload,
        ],
    )
    .map_err(|err| storage_error("store-insert", path, err))?;
    tx.commit()
        .map_err(|err| storage_error("store-commit", path, err))
}

fn storage_error(code: &str, path: &Path, err: impl ToString) -> SweepError {
    SweepError::Storage(
        ErrorInfo::new(code, err.to_string()).with_path(path),
    )
}
