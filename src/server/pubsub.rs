//! Pub/sub channel and pattern registries.

use crate::keyspace::glob_match;
use crate::resp::RespValue;
use crate::server::client::ClientId;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
pub struct PubSub {
    channels: RwLock<HashMap<Bytes, Vec<(ClientId, UnboundedSender<RespValue>)>>>,
    patterns: RwLock<HashMap<Bytes, Vec<(ClientId, UnboundedSender<RespValue>)>>>,
}

impl PubSub {
    pub fn subscribe(&self, channel: Bytes, id: ClientId, out: UnboundedSender<RespValue>) {
        self.channels.write().entry(channel).or_default().push((id, out));
    }

    pub fn unsubscribe(&self, channel: &[u8], id: ClientId) {
        if let Some(subs) = self.channels.write().get_mut(channel) {
            subs.retain(|(sid, _)| *sid != id);
        }
    }

    pub fn psubscribe(&self, pattern: Bytes, id: ClientId, out: UnboundedSender<RespValue>) {
        self.patterns.write().entry(pattern).or_default().push((id, out));
    }

    pub fn punsubscribe(&self, pattern: &[u8], id: ClientId) {
        if let Some(subs) = self.patterns.write().get_mut(pattern) {
            subs.retain(|(sid, _)| *sid != id);
        }
    }

    pub fn unsubscribe_all(&self, id: ClientId) {
        for subs in self.channels.write().values_mut() {
            subs.retain(|(sid, _)| *sid != id);
        }
        for subs in self.patterns.write().values_mut() {
            subs.retain(|(sid, _)| *sid != id);
        }
    }

    /// Publish a message, returning the number of subscribers (direct +
    /// pattern matches) it was delivered to.
    pub fn publish(&self, channel: &[u8], payload: &Bytes) -> i64 {
        let mut delivered = 0i64;
        if let Some(subs) = self.channels.read().get(channel) {
            for (_, out) in subs {
                let msg = RespValue::Push {
                    kind: "message".to_string(),
                    data: vec![
                        RespValue::BulkString(Bytes::copy_from_slice(channel)),
                        RespValue::BulkString(payload.clone()),
                    ],
                };
                if out.send(msg).is_ok() {
                    delivered += 1;
                }
            }
        }
        for (pattern, subs) in self.patterns.read().iter() {
            if glob_match(pattern, channel) {
                for (_, out) in subs {
                    let msg = RespValue::Push {
                        kind: "pmessage".to_string(),
                        data: vec![
                            RespValue::BulkString(pattern.clone()),
                            RespValue::BulkString(Bytes::copy_from_slice(channel)),
                            RespValue::BulkString(payload.clone()),
                        ],
                    };
                    if out.send(msg).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().values().filter(|v| !v.is_empty()).count()
    }

    pub fn channels_matching(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        self.channels
            .read()
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .filter(|(chan, _)| pattern.map(|p| glob_match(p, chan)).unwrap_or(true))
            .map(|(chan, _)| chan.clone())
            .collect()
    }

    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.read().get(channel).map(Vec::len).unwrap_or(0)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().values().filter(|v| !v.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn publish_delivers_to_direct_subscriber() {
        let ps = PubSub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ps.subscribe(Bytes::from_static(b"news"), 1, tx);
        let delivered = ps.publish(b"news", &Bytes::from_static(b"hello"));
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn publish_delivers_to_pattern_subscriber() {
        let ps = PubSub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ps.psubscribe(Bytes::from_static(b"news.*"), 1, tx);
        let delivered = ps.publish(b"news.sports", &Bytes::from_static(b"hi"));
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let ps = PubSub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ps.subscribe(Bytes::from_static(b"news"), 1, tx);
        ps.unsubscribe(b"news", 1);
        ps.publish(b"news", &Bytes::from_static(b"x"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_all_clears_both_kinds() {
        let ps = PubSub::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        ps.subscribe(Bytes::from_static(b"a"), 1, tx.clone());
        ps.psubscribe(Bytes::from_static(b"b*"), 1, tx);
        ps.unsubscribe_all(1);
        assert_eq!(ps.subscriber_count(b"a"), 0);
    }
}
