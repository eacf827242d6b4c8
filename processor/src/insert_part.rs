use std::sync::Arc;

use common::{Manager, Message};
use errors::Result;
use metrics::{counter, Counter};
use serde::{Deserialize, Serialize};
use utils::text;

use crate::{Config, Processor, ProcessorOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertPartConfig {
    /// Insertion index; negative values count from the end (-1 appends).
    pub index: i64,
    /// Part content; function variables are interpolated per message.
    pub content: String,
}

impl Default for InsertPartConfig {
    fn default() -> Self {
        InsertPartConfig {
            index: -1,
            content: String::new(),
        }
    }
}

pub fn new_insert_part(conf: &Config, _manager: &Arc<Manager>) -> Result<Box<dyn Processor>> {
    Ok(Box::new(InsertPart::new(&conf.insert_part)))
}

/// Inserts a configured part into each message. The interpolation check is
/// done once at construction so plain contents skip the rewrite entirely.
pub struct InsertPart {
    index: i64,
    content: Vec<u8>,
    interpolate: bool,

    m_count: Counter,
    m_sent: Counter,
}

impl InsertPart {
    pub fn new(conf: &InsertPartConfig) -> Self {
        let content = conf.content.as_bytes().to_vec();
        InsertPart {
            index: conf.index,
            interpolate: text::contains_function_variables(&content),
            content,

            m_count: counter!("processor_insert_part_count"),
            m_sent: counter!("processor_insert_part_sent"),
        }
    }
}

impl Processor for InsertPart {
    fn process(&mut self, mut msg: Message) -> ProcessorOutput {
        self.m_count.increment(1);

        let part = if self.interpolate {
            text::replace_function_variables(Some(&msg), &self.content)
        } else {
            self.content.clone()
        };

        let parts = msg.len() as i64;
        let index = if self.index < 0 {
            (parts + self.index + 1).max(0)
        } else {
            self.index.min(parts)
        };
        msg.insert_part(index as usize, part);

        self.m_sent.increment(1);
        ProcessorOutput::Emit(vec![msg])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(parts: &[&str]) -> Message {
        Message::new(parts.iter().map(|p| p.as_bytes().to_vec()).collect())
    }

    fn emitted(out: ProcessorOutput) -> Message {
        match out {
            ProcessorOutput::Emit(mut msgs) => msgs.remove(0),
            other => panic!("expected emission, got {other:?}"),
        }
    }

    #[test]
    fn test_appends_by_default() {
        let conf = InsertPartConfig {
            content: "tail".to_string(),
            ..InsertPartConfig::default()
        };
        let mut insert = InsertPart::new(&conf);
        let out = emitted(insert.process(msg(&["a", "b"])));
        assert_eq!(out.parts(), &[b"a".to_vec(), b"b".to_vec(), b"tail".to_vec()]);
    }

    #[test]
    fn test_prepends_at_zero_and_clamps() {
        let conf = InsertPartConfig {
            index: 0,
            content: "head".to_string(),
        };
        let mut insert = InsertPart::new(&conf);
        let out = emitted(insert.process(msg(&["a"])));
        assert_eq!(out.get(0), Some(&b"head"[..]));

        let conf = InsertPartConfig {
            index: 99,
            content: "tail".to_string(),
        };
        let mut insert = InsertPart::new(&conf);
        let out = emitted(insert.process(msg(&["a"])));
        assert_eq!(out.get(1), Some(&b"tail"[..]));
    }

    #[test]
    fn test_content_interpolates_metadata() {
        let conf = InsertPartConfig {
            content: "from ${!metadata:origin}".to_string(),
            ..InsertPartConfig::default()
        };
        let mut insert = InsertPart::new(&conf);

        let mut input = msg(&["a"]);
        input.set_metadata("origin", "upstream");
        let out = emitted(insert.process(input));
        assert_eq!(out.get(1), Some(&b"from upstream"[..]));
    }
}
