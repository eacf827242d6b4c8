use std::collections::HashMap;
use std::sync::Arc;

use common::{Manager, Message, Response};
use errors::{ConfigError, Result};
use log::debug;
use metrics::{counter, Counter};
use serde::{Deserialize, Serialize};

use crate::{Config, Processor, ProcessorOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Number of parts at which a buffered batch is emitted.
    pub parts: usize,
    /// Emit a partial batch as a terminal message when the hosting pipeline
    /// drains. When unset, buffered parts are dropped on close and their
    /// upstream deliveries stay unacknowledged.
    pub flush_on_close: bool,
}

impl Default for CombineConfig {
    fn default() -> Self {
        CombineConfig {
            parts: 2,
            flush_on_close: false,
        }
    }
}

pub fn new_combine(conf: &Config, _manager: &Arc<Manager>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(Combine::new(&conf.combine)?))
}

/// Stateful batcher: buffers message parts until the target count is
/// reached, then emits them as one multi-part message. While buffering it
/// responds SkipAck so the source keeps the original deliveries open and
/// submits more work; the eventual acknowledgement of the batch covers every
/// delivery that contributed to it.
pub struct Combine {
    parts: usize,
    flush_on_close: bool,
    buffer: Vec<Vec<u8>>,
    metadata: HashMap<String, String>,

    m_count: Counter,
    m_warn_parts: Counter,
    m_sent: Counter,
    m_sent_parts: Counter,
    m_dropped: Counter,
}

impl Combine {
    pub fn new(conf: &CombineConfig) -> Result<Self> {
        if conf.parts < 1 {
            return Err(ConfigError::InvalidField {
                field: "combine.parts",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(Combine {
            parts: conf.parts,
            flush_on_close: conf.flush_on_close,
            buffer: Vec::new(),
            metadata: HashMap::new(),

            m_count: counter!("processor_combine_count"),
            m_warn_parts: counter!("processor_combine_warning_too_many_parts"),
            m_sent: counter!("processor_combine_sent"),
            m_sent_parts: counter!("processor_combine_parts_sent"),
            m_dropped: counter!("processor_combine_dropped"),
        })
    }

    fn take_batch(&mut self) -> Message {
        Message::with_metadata(std::mem::take(&mut self.buffer), self.metadata.clone())
    }
}

impl Processor for Combine {
    fn process(&mut self, msg: Message) -> ProcessorOutput {
        self.m_count.increment(1);

        // An oversize message passes through unchanged, even ahead of
        // buffered parts. This can reorder parts through the platform.
        if msg.len() > self.parts {
            self.m_warn_parts.increment(1);
            self.m_sent.increment(1);
            self.m_sent_parts.increment(msg.len() as u64);
            return ProcessorOutput::Emit(vec![msg]);
        }

        let (parts, metadata) = msg.into_parts();
        self.buffer.extend(parts);
        self.metadata = metadata;

        if self.buffer.len() >= self.parts {
            let batch = self.take_batch();
            self.m_sent.increment(1);
            self.m_sent_parts.increment(batch.len() as u64);
            debug!("combine: emitting batch of {} parts", batch.len());
            return ProcessorOutput::Emit(vec![batch]);
        }

        self.m_dropped.increment(1);
        ProcessorOutput::Respond(Response::SkipAck)
    }

    fn flush(&mut self) -> Option<Message> {
        if !self.flush_on_close || self.buffer.is_empty() {
            return None;
        }
        let batch = self.take_batch();
        debug!("combine: flushing partial batch of {} parts", batch.len());
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(parts: &[&str]) -> Message {
        Message::new(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
    }

    fn emitted(out: ProcessorOutput) -> Vec<Message> {
        match out {
            ProcessorOutput::Emit(msgs) => msgs,
            other => panic!("expected emission, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_zero_parts() {
        let conf = CombineConfig {
            parts: 0,
            ..CombineConfig::default()
        };
        assert!(Combine::new(&conf).is_err());
    }

    #[test]
    fn test_buffers_until_threshold() {
        let mut combine = Combine::new(&CombineConfig::default()).unwrap();

        match combine.process(msg(&["a"])) {
            ProcessorOutput::Respond(Response::SkipAck) => {}
            other => panic!("expected SkipAck, got {other:?}"),
        }

        let out = emitted(combine.process(msg(&["b"])));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].parts(), &[b"a".to_vec(), b"b".to_vec()]);

        // The buffer is clear again.
        match combine.process(msg(&["c"])) {
            ProcessorOutput::Respond(Response::SkipAck) => {}
            other => panic!("expected SkipAck, got {other:?}"),
        }
    }

    #[test]
    fn test_oversize_message_passes_through() {
        let mut combine = Combine::new(&CombineConfig::default()).unwrap();
        let out = emitted(combine.process(msg(&["x", "y", "z"])));
        assert_eq!(out[0].parts(), &[b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn test_all_parts_of_threshold_crossing_message_are_included() {
        // Threshold 4: a 2-part message buffers, a following 3-part message
        // crosses it, and the batch carries all 5 parts.
        let conf = CombineConfig {
            parts: 4,
            ..CombineConfig::default()
        };
        let mut combine = Combine::new(&conf).unwrap();

        assert!(matches!(
            combine.process(msg(&["a", "b"])),
            ProcessorOutput::Respond(Response::SkipAck)
        ));
        let out = emitted(combine.process(msg(&["c", "d", "e"])));
        assert_eq!(out[0].len(), 5);
    }

    #[test]
    fn test_batch_metadata_matches_last_contributor() {
        let mut combine = Combine::new(&CombineConfig::default()).unwrap();

        let mut first = msg(&["a"]);
        first.set_metadata("origin", "first");
        let mut second = msg(&["b"]);
        second.set_metadata("origin", "second");

        combine.process(first);
        let out = emitted(combine.process(second));
        assert_eq!(out[0].metadata("origin"), Some("second"));
    }

    #[test]
    fn test_flush_disabled_by_default() {
        let mut combine = Combine::new(&CombineConfig::default()).unwrap();
        combine.process(msg(&["a"]));
        assert!(combine.flush().is_none());
    }

    #[test]
    fn test_flush_on_close_emits_partial_batch() {
        let conf = CombineConfig {
            parts: 3,
            flush_on_close: true,
        };
        let mut combine = Combine::new(&conf).unwrap();
        combine.process(msg(&["a"]));
        combine.process(msg(&["b"]));

        let batch = combine.flush().expect("partial batch");
        assert_eq!(batch.parts(), &[b"a".to_vec(), b"b".to_vec()]);
        assert!(combine.flush().is_none());
    }

    #[test]
    fn test_oversize_counter_increments() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, || {
            let mut combine = Combine::new(&CombineConfig::default()).unwrap();
            combine.process(msg(&["x", "y", "z"]));
        });

        let warned = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| {
                (key.key().name() == "processor_combine_warning_too_many_parts").then_some(value)
            });
        assert!(matches!(warned, Some(DebugValue::Counter(1))));
    }
}
