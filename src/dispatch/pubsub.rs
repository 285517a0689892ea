//! `SUBSCRIBE`/`UNSUBSCRIBE`/`PSUBSCRIBE`/`PUNSUBSCRIBE`/`PUBLISH`/`PUBSUB`.
//!
//! Subscription confirmations are pushed directly onto the client's frame
//! channel rather than returned as the command's reply, since a single
//! `SUBSCRIBE a b c` produces one confirmation frame per channel.

use crate::error::{RedisError, Result};
use crate::keyspace::glob_match;
use crate::resp::RespValue;
use crate::server::client::ClientState;
use crate::server::pubsub::PubSub;
use bytes::Bytes;

fn confirm(kind: &str, channel: &Bytes, count: usize) -> RespValue {
    RespValue::Push {
        kind: kind.to_string(),
        data: vec![
            RespValue::BulkString(channel.clone()),
            RespValue::Integer(count as i64),
        ],
    }
}

pub fn subscribe(pubsub: &PubSub, client: &mut ClientState, args: &[Bytes]) {
    for channel in &args[1..] {
        client.subscriptions.insert(channel.clone());
        pubsub.subscribe(channel.clone(), client.id, client.out_tx.clone());
        client.send(confirm("subscribe", channel, client.subscription_count()));
    }
}

pub fn unsubscribe(pubsub: &PubSub, client: &mut ClientState, args: &[Bytes]) {
    let channels: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        client.subscriptions.iter().cloned().collect()
    };
    if channels.is_empty() {
        client.send(confirm("unsubscribe", &Bytes::new(), client.subscription_count()));
        return;
    }
    for channel in channels {
        client.subscriptions.remove(&channel);
        pubsub.unsubscribe(&channel, client.id);
        client.send(confirm("unsubscribe", &channel, client.subscription_count()));
    }
}

pub fn psubscribe(pubsub: &PubSub, client: &mut ClientState, args: &[Bytes]) {
    for pattern in &args[1..] {
        client.psubscriptions.insert(pattern.clone());
        pubsub.psubscribe(pattern.clone(), client.id, client.out_tx.clone());
        client.send(confirm("psubscribe", pattern, client.subscription_count()));
    }
}

pub fn punsubscribe(pubsub: &PubSub, client: &mut ClientState, args: &[Bytes]) {
    let patterns: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        client.psubscriptions.iter().cloned().collect()
    };
    if patterns.is_empty() {
        client.send(confirm("punsubscribe", &Bytes::new(), client.subscription_count()));
        return;
    }
    for pattern in patterns {
        client.psubscriptions.remove(&pattern);
        pubsub.punsubscribe(&pattern, client.id);
        client.send(confirm("punsubscribe", &pattern, client.subscription_count()));
    }
}

pub fn publish(pubsub: &PubSub, args: &[Bytes]) -> RespValue {
    RespValue::Integer(pubsub.publish(&args[1], &args[2]))
}

pub fn pubsub_cmd(pubsub: &PubSub, args: &[Bytes]) -> Result<RespValue> {
    let sub = String::from_utf8_lossy(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "CHANNELS" => {
            let pattern = args.get(2).map(|p| p.as_ref());
            let matched: Vec<Bytes> = pubsub
                .channels_matching(None)
                .into_iter()
                .filter(|c| pattern.map_or(true, |p| glob_match(p, c)))
                .collect();
            Ok(RespValue::Array(matched.into_iter().map(RespValue::BulkString).collect()))
        }
        "NUMSUB" => {
            let mut out = Vec::new();
            for channel in &args[2..] {
                out.push(RespValue::BulkString(channel.clone()));
                out.push(RespValue::Integer(pubsub.subscriber_count(channel) as i64));
            }
            Ok(RespValue::Array(out))
        }
        "NUMPAT" => Ok(RespValue::Integer(pubsub.pattern_count() as i64)),
        _ => Err(RedisError::err(format!("Unknown PUBSUB subcommand '{sub}'"))),
    }
}
