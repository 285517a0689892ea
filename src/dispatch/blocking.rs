//! Blocking list/zset commands: `BLPOP`, `BRPOP`, `BLMOVE`, `BRPOPLPUSH`,
//! `BZPOPMIN`, `BZPOPMAX`.
//!
//! Each polls the keyspace once, and if nothing is available registers with
//! the [`BlockingManager`] and waits to be woken by the next push/add to one
//! of the keys it cares about, re-polling once woken. The keyspace lock is
//! never held across an await.

use crate::error::Result;
use crate::keyspace::Keyspace;
use crate::resp::RespValue;
use crate::server::blocking::BlockingManager;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

fn parse_timeout(b: &[u8]) -> Result<f64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|t| *t >= 0.0)
        .ok_or_else(crate::error::RedisError::not_float)
}

/// Resolves as soon as any of the given notifications fires.
async fn wait_any(notifies: &[Arc<Notify>]) {
    let mut futs: Vec<Pin<Box<dyn Future<Output = ()> + '_>>> =
        notifies.iter().map(|n| Box::pin(n.notified()) as Pin<Box<dyn Future<Output = ()>>>).collect();
    std::future::poll_fn(move |cx: &mut TaskContext<'_>| {
        for f in futs.iter_mut() {
            if f.as_mut().poll(cx).is_ready() {
                return Poll::Ready(());
            }
        }
        Poll::Pending
    })
    .await
}

/// Waits on `notifies` honoring an optional absolute deadline. Returns
/// `true` if woken before the deadline (or there is no deadline at all).
async fn wait_until(notifies: &[Arc<Notify>], deadline: Option<Instant>) -> bool {
    match deadline {
        Some(d) => {
            let remaining = d.saturating_duration_since(Instant::now());
            tokio::time::timeout(remaining, wait_any(notifies)).await.is_ok()
        }
        None => {
            wait_any(notifies).await;
            true
        }
    }
}

fn deadline_from_secs(timeout_secs: f64) -> Option<Instant> {
    if timeout_secs > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(timeout_secs))
    } else {
        None
    }
}

pub async fn blpop(
    keyspace: &Keyspace,
    blocking: &BlockingManager,
    db_index: usize,
    args: &[Bytes],
    from_tail: bool,
) -> Result<RespValue> {
    let timeout_secs = parse_timeout(&args[args.len() - 1])?;
    let keys: Vec<Bytes> = args[1..args.len() - 1].to_vec();
    let deadline = deadline_from_secs(timeout_secs);

    loop {
        {
            let mut db = keyspace.db(db_index).write();
            for key in &keys {
                if let Some(v) = db.get_mut(key) {
                    let list = v.as_list_mut()?;
                    let item = if from_tail { list.pop_back() } else { list.pop_front() };
                    if let Some(item) = item {
                        if list.is_empty() {
                            db.remove(key);
                        }
                        return Ok(RespValue::Array(vec![
                            RespValue::BulkString(key.clone()),
                            RespValue::BulkString(item),
                        ]));
                    }
                }
            }
        }

        let notifies: Vec<Arc<Notify>> = keys.iter().map(|k| blocking.register(db_index, k)).collect();
        let woke = wait_until(&notifies, deadline).await;
        for (key, notify) in keys.iter().zip(notifies.iter()) {
            blocking.unregister(db_index, key, notify);
        }
        if !woke || deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(RespValue::Null);
        }
    }
}

pub async fn blmove(
    keyspace: &Keyspace,
    blocking: &BlockingManager,
    db_index: usize,
    args: &[Bytes],
) -> Result<RespValue> {
    let timeout_secs = parse_timeout(&args[5])?;
    let src = args[1].clone();
    let move_args: Vec<Bytes> = args[0..5].to_vec();
    let deadline = deadline_from_secs(timeout_secs);

    loop {
        let result = {
            let mut db = keyspace.db(db_index).write();
            super::lists::lmove(&mut db, &move_args)?
        };
        if !matches!(result, RespValue::Null) {
            return Ok(result);
        }
        let notify = blocking.register(db_index, &src);
        let woke = wait_until(std::slice::from_ref(&notify), deadline).await;
        blocking.unregister(db_index, &src, &notify);
        if !woke || deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(RespValue::Null);
        }
    }
}

pub async fn brpoplpush(
    keyspace: &Keyspace,
    blocking: &BlockingManager,
    db_index: usize,
    args: &[Bytes],
) -> Result<RespValue> {
    let synthetic = vec![
        Bytes::from_static(b"BLMOVE"),
        args[1].clone(),
        args[2].clone(),
        Bytes::from_static(b"RIGHT"),
        Bytes::from_static(b"LEFT"),
        args[3].clone(),
    ];
    blmove(keyspace, blocking, db_index, &synthetic).await
}

pub async fn bzpop(
    keyspace: &Keyspace,
    blocking: &BlockingManager,
    db_index: usize,
    args: &[Bytes],
    highest: bool,
) -> Result<RespValue> {
    let timeout_secs = parse_timeout(&args[args.len() - 1])?;
    let keys: Vec<Bytes> = args[1..args.len() - 1].to_vec();
    let deadline = deadline_from_secs(timeout_secs);

    loop {
        {
            let mut db = keyspace.db(db_index).write();
            for key in &keys {
                if let Some(v) = db.get_mut(key) {
                    let zset = v.as_zset_mut()?;
                    if !zset.is_empty() {
                        let mut sorted = zset.iter_sorted();
                        let (member, score) = if highest {
                            sorted.pop().unwrap()
                        } else {
                            sorted.remove(0)
                        };
                        zset.remove(&member);
                        if zset.is_empty() {
                            db.remove(key);
                        }
                        return Ok(RespValue::Array(vec![
                            RespValue::BulkString(key.clone()),
                            RespValue::BulkString(member),
                            RespValue::Double(score),
                        ]));
                    }
                }
            }
        }

        let notifies: Vec<Arc<Notify>> = keys.iter().map(|k| blocking.register(db_index, k)).collect();
        let woke = wait_until(&notifies, deadline).await;
        for (key, notify) in keys.iter().zip(notifies.iter()) {
            blocking.unregister(db_index, key, notify);
        }
        if !woke || deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(RespValue::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ListValue, Value};

    #[tokio::test]
    async fn blpop_returns_immediately_when_data_present() {
        let ks = Keyspace::new(1);
        let blocking = BlockingManager::default();
        let mut list = ListValue::new();
        list.push_back(Bytes::from_static(b"v"));
        ks.db(0).write().set(Bytes::from_static(b"k"), Value::List(list));

        let result = blpop(
            &ks,
            &blocking,
            0,
            &[Bytes::from_static(b"BLPOP"), Bytes::from_static(b"k"), Bytes::from_static(b"0")],
            false,
        )
        .await
        .unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(Bytes::from_static(b"k")), RespValue::BulkString(Bytes::from_static(b"v"))])
        );
    }

    #[tokio::test]
    async fn blpop_times_out_on_empty_key() {
        let ks = Keyspace::new(1);
        let blocking = BlockingManager::default();
        let result = blpop(
            &ks,
            &blocking,
            0,
            &[Bytes::from_static(b"BLPOP"), Bytes::from_static(b"missing"), Bytes::from_static(b"0.05")],
            false,
        )
        .await
        .unwrap();
        assert_eq!(result, RespValue::Null);
    }

    #[tokio::test]
    async fn blpop_wakes_on_push() {
        let ks = Keyspace::new(1);
        let blocking = BlockingManager::default();
        let ks_ref: &'static Keyspace = Box::leak(Box::new(Keyspace::new(1)));
        let blocking_ref: &'static BlockingManager = Box::leak(Box::new(BlockingManager::default()));
        let _ = (&ks, &blocking);

        let handle = tokio::spawn(async move {
            blpop(
                ks_ref,
                blocking_ref,
                0,
                &[Bytes::from_static(b"BLPOP"), Bytes::from_static(b"k"), Bytes::from_static(b"1")],
                false,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut list = ListValue::new();
        list.push_back(Bytes::from_static(b"v"));
        ks_ref.db(0).write().set(Bytes::from_static(b"k"), Value::List(list));
        blocking_ref.notify_key(0, b"k");

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(Bytes::from_static(b"k")), RespValue::BulkString(Bytes::from_static(b"v"))])
        );
    }
}
