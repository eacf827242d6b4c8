use std::sync::Arc;

use common::{Manager, Message, Response};
use errors::Result;
use log::debug;
use metrics::{counter, Counter};
use serde::{Deserialize, Serialize};

use crate::{Config, Processor, ProcessorOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsCheckConfig {
    pub max_parts: usize,
    pub min_parts: usize,
    pub max_part_size: usize,
    pub min_part_size: usize,
}

impl Default for BoundsCheckConfig {
    fn default() -> Self {
        BoundsCheckConfig {
            max_parts: 100,
            min_parts: 1,
            max_part_size: 1 << 30, // 1GB
            min_part_size: 1,
        }
    }
}

pub fn new_bounds_check(conf: &Config, _manager: &Arc<Manager>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(BoundsCheck::new(&conf.bounds_check)))
}

/// Filter that drops messages falling outside the configured part-count and
/// part-size bounds. Dropped messages are acknowledged upstream: the message
/// was handled, there is just nothing to forward.
pub struct BoundsCheck {
    conf: BoundsCheckConfig,

    m_count: Counter,
    m_dropped: Counter,
    m_dropped_empty: Counter,
    m_dropped_num_parts: Counter,
    m_dropped_part_size: Counter,
    m_sent: Counter,
    m_sent_parts: Counter,
}

impl BoundsCheck {
    pub fn new(conf: &BoundsCheckConfig) -> Self {
        BoundsCheck {
            conf: conf.clone(),

            m_count: counter!("processor_bounds_check_count"),
            m_dropped: counter!("processor_bounds_check_dropped"),
            m_dropped_empty: counter!("processor_bounds_check_dropped_empty"),
            m_dropped_num_parts: counter!("processor_bounds_check_dropped_num_parts"),
            m_dropped_part_size: counter!("processor_bounds_check_dropped_part_size"),
            m_sent: counter!("processor_bounds_check_sent"),
            m_sent_parts: counter!("processor_bounds_check_parts_sent"),
        }
    }
}

impl Processor for BoundsCheck {
    fn process(&mut self, msg: Message) -> ProcessorOutput {
        self.m_count.increment(1);

        let parts = msg.len();
        if parts < self.conf.min_parts {
            debug!(
                "bounds_check: rejecting message with parts below minimum ({}): {}",
                self.conf.min_parts, parts
            );
            self.m_dropped.increment(1);
            self.m_dropped_empty.increment(1);
            return ProcessorOutput::Respond(Response::Ack);
        }
        if parts > self.conf.max_parts {
            debug!(
                "bounds_check: rejecting message with parts exceeding limit ({}): {}",
                self.conf.max_parts, parts
            );
            self.m_dropped.increment(1);
            self.m_dropped_num_parts.increment(1);
            return ProcessorOutput::Respond(Response::Ack);
        }

        for part in msg.parts() {
            let size = part.len();
            if size > self.conf.max_part_size || size < self.conf.min_part_size {
                debug!(
                    "bounds_check: rejecting message with part size outside {} -> {}: {}",
                    self.conf.min_part_size, self.conf.max_part_size, size
                );
                self.m_dropped.increment(1);
                self.m_dropped_part_size.increment(1);
                return ProcessorOutput::Respond(Response::Ack);
            }
        }

        self.m_sent.increment(1);
        self.m_sent_parts.increment(parts as u64);
        ProcessorOutput::Emit(vec![msg])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    use super::*;

    fn msg(parts: &[&str]) -> Message {
        Message::new(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
    }

    fn counter_values(snapshotter: &Snapshotter) -> HashMap<String, u64> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(v) => Some((key.key().name().to_string(), v)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_within_bounds_passes_unchanged() {
        let conf = BoundsCheckConfig {
            max_parts: 3,
            min_parts: 2,
            max_part_size: 10,
            min_part_size: 2,
        };
        let mut check = BoundsCheck::new(&conf);

        let input = msg(&["abc", "def"]);
        match check.process(input.clone()) {
            ProcessorOutput::Emit(out) => assert_eq!(out, vec![input]),
            other => panic!("expected emission, got {other:?}"),
        }
    }

    #[test]
    fn test_drops_are_acked_never_errored() {
        let conf = BoundsCheckConfig {
            max_parts: 2,
            min_parts: 1,
            max_part_size: 4,
            min_part_size: 2,
        };
        let mut check = BoundsCheck::new(&conf);

        // Too many parts, too few parts, part too large, part too small.
        let rejects = [
            msg(&["ab", "cd", "ef"]),
            msg(&[]),
            msg(&["abcde"]),
            msg(&["a"]),
        ];
        for reject in rejects {
            match check.process(reject) {
                ProcessorOutput::Respond(Response::Ack) => {}
                other => panic!("expected drop with Ack, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_drop_reason_counters() {
        let conf = BoundsCheckConfig {
            max_parts: 2,
            ..BoundsCheckConfig::default()
        };

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, || {
            let mut check = BoundsCheck::new(&conf);
            check.process(msg(&["a", "b", "c"]));
        });

        let counters = counter_values(&snapshotter);
        assert_eq!(counters.get("processor_bounds_check_dropped_num_parts"), Some(&1));
        assert_eq!(counters.get("processor_bounds_check_dropped"), Some(&1));
        assert_eq!(counters.get("processor_bounds_check_sent"), None);
    }
}
