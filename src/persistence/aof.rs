//! Append-only write log: every accepted write command is re-serialized as
//! its original RESP frame and appended with a best-effort flush. Replay
//! re-applies the log against a fresh keyspace at startup; rewrite compacts
//! it down to the minimal command sequence that reconstructs current state.

use crate::error::{RedisError, Result};
use crate::keyspace::Keyspace;
use crate::resp::{encode_command, parser, RespValue};
use crate::value::Value;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

fn append_command(buf: &mut Vec<u8>, args: &[Bytes]) {
    let refs: Vec<&[u8]> = args.iter().map(|b| b.as_ref()).collect();
    buf.extend_from_slice(&encode_command(&refs));
}

/// Appends RESP-framed write commands to a file, flushing after every
/// write. Held behind a single writer per server; concurrent access is
/// serialized by the caller (the dispatcher holds it behind a mutex).
pub struct AofWriter {
    file: std::fs::File,
    path: PathBuf,
    enabled: bool,
    selected_db: Option<usize>,
}

impl AofWriter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RedisError::Persistence(format!("opening append log: {e}")))?;
        Ok(Self {
            file,
            path,
            enabled: true,
            selected_db: None,
        })
    }

    /// Disabled during replay so replayed commands aren't re-logged.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one write command, framed exactly as the client sent it. Emits
    /// a `SELECT` ahead of it only when the target db differs from the last
    /// one written, keeping the log close to what a client session sends.
    pub fn append(&mut self, db_index: usize, args: &[Bytes]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut buf = Vec::new();
        if self.selected_db != Some(db_index) {
            append_command(
                &mut buf,
                &[Bytes::from_static(b"SELECT"), Bytes::from(db_index.to_string())],
            );
            self.selected_db = Some(db_index);
        }
        append_command(&mut buf, args);
        self.file
            .write_all(&buf)
            .map_err(|e| RedisError::Persistence(format!("appending to log: {e}")))?;
        // Best-effort: a failed flush loses at most the last write, it does
        // not corrupt the file, so we don't treat it as fatal.
        let _ = self.file.flush();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replays every command in the log at `path`, calling `apply` for each
/// (db_index, args) pair. `apply` is expected to mutate the keyspace
/// directly and must not re-append to the log. Tolerates a corrupted or
/// truncated tail: logs a warning and stops there rather than failing the
/// whole replay.
pub fn replay(
    path: impl AsRef<Path>,
    mut apply: impl FnMut(usize, &[Bytes]) -> Result<()>,
) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    let data = Bytes::from(
        std::fs::read(path).map_err(|e| RedisError::Persistence(format!("reading append log: {e}")))?,
    );

    let mut offset = 0usize;
    let mut db_index = 0usize;
    let mut commands_replayed = 0u64;

    while offset < data.len() {
        let remaining = data.slice(offset..);
        let (frame, consumed) = match parser::parse(&remaining) {
            Ok((frame, consumed)) => (frame, consumed),
            Err(RedisError::Incomplete) => {
                warn!(
                    bytes_remaining = remaining.len(),
                    "append log ends mid-frame, stopping replay (partial tail tolerated)"
                );
                break;
            }
            Err(e) => {
                warn!(error = %e, offset, "append log frame failed to parse, stopping replay");
                break;
            }
        };

        let args = match frame_to_args(&frame) {
            Some(args) => args,
            None => {
                warn!(offset, "append log entry was not a command array, skipping");
                offset += consumed;
                continue;
            }
        };

        if args.is_empty() {
            offset += consumed;
            continue;
        }

        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        if name == "SELECT" {
            if let Some(n) = args.get(1).and_then(|b| std::str::from_utf8(b).ok()) {
                if let Ok(n) = n.parse::<usize>() {
                    db_index = n;
                }
            }
            offset += consumed;
            continue;
        }

        if let Err(e) = apply(db_index, &args) {
            warn!(error = %e, command = %name, "append log replay command failed, continuing");
        } else {
            commands_replayed += 1;
        }
        offset += consumed;
    }

    tracing::info!(commands_replayed, "append log replay complete");
    Ok(())
}

fn frame_to_args(frame: &RespValue) -> Option<Vec<Bytes>> {
    match frame {
        RespValue::Array(items) => items
            .iter()
            .map(|item| match item {
                RespValue::BulkString(b) => Some(b.clone()),
                RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Rewrite the log: emit the minimal command sequence that reconstructs
/// `keyspace` into a new file, then atomically rename it over `path`.
/// Concurrent writes accepted while this runs must be buffered by the
/// caller and appended to the new file after the rename (the caller holds
/// the AOF lock across the rename and replays the buffer through a fresh
/// `AofWriter::append` once this returns).
pub fn rewrite(keyspace: &Keyspace, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("rewrite.tmp");
    let mut buf = Vec::new();

    for db_index in 0..keyspace.count() {
        let mut db = keyspace.db(db_index).write();
        if db.is_empty() {
            continue;
        }
        append_command(
            &mut buf,
            &[Bytes::from_static(b"SELECT"), Bytes::from(db_index.to_string())],
        );

        let (_, keys) = db.scan(0, usize::MAX);
        let mut keys = keys;
        keys.sort();
        for key in keys {
            let Some(entry) = db.get_entry(&key) else { continue };
            let value = entry.value.clone();
            emit_reconstruction_commands(&mut buf, &key, &value);
            if let Some(remaining_ms) = db.pttl(&key) {
                let deadline = crate::keyspace::now_ms() + remaining_ms;
                append_command(
                    &mut buf,
                    &[
                        Bytes::from_static(b"PEXPIREAT"),
                        key.clone(),
                        Bytes::from(deadline.to_string()),
                    ],
                );
            }
        }
    }

    {
        let mut f = std::fs::File::create(&tmp_path)
            .map_err(|e| RedisError::Persistence(format!("creating rewrite temp file: {e}")))?;
        f.write_all(&buf)
            .map_err(|e| RedisError::Persistence(format!("writing rewrite temp file: {e}")))?;
        f.sync_all()
            .map_err(|e| RedisError::Persistence(format!("syncing rewrite temp file: {e}")))?;
    }
    std::fs::rename(&tmp_path, path)
        .map_err(|e| RedisError::Persistence(format!("renaming rewritten log into place: {e}")))?;
    Ok(())
}

fn emit_reconstruction_commands(buf: &mut Vec<u8>, key: &Bytes, value: &Value) {
    match value {
        Value::String(s) => {
            append_command(buf, &[Bytes::from_static(b"SET"), key.clone(), s.as_bytes()]);
        }
        Value::List(l) => {
            let mut args = vec![Bytes::from_static(b"RPUSH"), key.clone()];
            args.extend(l.iter().cloned());
            if args.len() > 2 {
                append_command(buf, &args);
            }
        }
        Value::Set(s) => {
            let mut members = s.members();
            members.sort();
            let mut args = vec![Bytes::from_static(b"SADD"), key.clone()];
            args.extend(members);
            if args.len() > 2 {
                append_command(buf, &args);
            }
        }
        Value::ZSet(z) => {
            let mut args = vec![Bytes::from_static(b"ZADD"), key.clone()];
            for (member, score) in z.iter_sorted() {
                args.push(Bytes::from(format_score(score)));
                args.push(member);
            }
            if args.len() > 2 {
                append_command(buf, &args);
            }
        }
        Value::Hash(h) => {
            let mut fields: Vec<(Bytes, Bytes)> =
                h.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut args = vec![Bytes::from_static(b"HSET"), key.clone()];
            for (field, val) in fields {
                args.push(field);
                args.push(val);
            }
            if args.len() > 2 {
                append_command(buf, &args);
            }
        }
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.is_finite() {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringValue;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("ferrite-aof-test-{name}-{}", std::process::id()));
        p
    }

    fn s(text: &str) -> Value {
        Value::String(StringValue::from_bytes(Bytes::copy_from_slice(text.as_bytes())))
    }

    #[test]
    fn append_and_replay_round_trip() {
        let path = temp_path("append-replay");
        let _ = std::fs::remove_file(&path);

        {
            let mut writer = AofWriter::open(&path).unwrap();
            writer
                .append(0, &[Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")])
                .unwrap();
            writer
                .append(
                    1,
                    &[Bytes::from_static(b"SET"), Bytes::from_static(b"k2"), Bytes::from_static(b"v2")],
                )
                .unwrap();
        }

        let ks = Keyspace::new(4);
        replay(&path, |db_index, args| {
            let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
            if name == "SET" {
                ks.db(db_index)
                    .write()
                    .set(args[1].clone(), Value::String(StringValue::from_bytes(args[2].clone())));
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(
            ks.db(0).write().get(b"k").unwrap().as_string().unwrap().as_bytes(),
            Bytes::from_static(b"v")
        );
        assert_eq!(
            ks.db(1).write().get(b"k2").unwrap().as_string().unwrap().as_bytes(),
            Bytes::from_static(b"v2")
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn replay_missing_file_is_a_noop() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);
        let result = replay(&path, |_, _| Ok(()));
        assert!(result.is_ok());
    }

    #[test]
    fn replay_tolerates_truncated_tail() {
        let path = temp_path("truncated");
        let _ = std::fs::remove_file(&path);
        {
            let mut writer = AofWriter::open(&path).unwrap();
            writer
                .append(0, &[Bytes::from_static(b"SET"), Bytes::from_static(b"a"), Bytes::from_static(b"1")])
                .unwrap();
        }
        // Truncate mid-frame to simulate a crash during append.
        let mut data = std::fs::read(&path).unwrap();
        data.truncate(data.len() - 3);
        std::fs::write(&path, &data).unwrap();

        let mut applied = 0;
        replay(&path, |_, _| {
            applied += 1;
            Ok(())
        })
        .unwrap();
        // The truncated SET frame at the tail is dropped; nothing else
        // precedes it to apply.
        assert_eq!(applied, 0);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rewrite_produces_minimal_reconstructable_log() {
        let path = temp_path("rewrite");
        let _ = std::fs::remove_file(&path);

        let ks = Keyspace::new(1);
        ks.db(0).write().set(Bytes::from_static(b"k"), s("v"));

        rewrite(&ks, &path).unwrap();

        let ks2 = Keyspace::new(1);
        replay(&path, |db_index, args| {
            let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
            if name == "SET" {
                ks2.db(db_index)
                    .write()
                    .set(args[1].clone(), Value::String(StringValue::from_bytes(args[2].clone())));
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(
            ks2.db(0).write().get(b"k").unwrap().as_string().unwrap().as_bytes(),
            Bytes::from_static(b"v")
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn writer_disabled_during_replay_does_not_append() {
        let path = temp_path("disabled");
        let _ = std::fs::remove_file(&path);
        let mut writer = AofWriter::open(&path).unwrap();
        writer.set_enabled(false);
        writer
            .append(0, &[Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")])
            .unwrap();
        let data = std::fs::read(&path).unwrap();
        assert!(data.is_empty());
        std::fs::remove_file(&path).unwrap();
    }
}
