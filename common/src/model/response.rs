use errors::Error;

/// The outcome of handling a transaction, flowing backwards along the reply
/// sink. A value, not an exception.
#[derive(Debug, Clone)]
pub enum Response {
    /// Delivery succeeded; the upstream may commit the delivery.
    Ack,
    /// Delivery failed; the upstream should treat the delivery as
    /// unacknowledged and is free to retry.
    Error(Error),
    /// The consumer is withholding a decision; the upstream must keep the
    /// original delivery open and continue producing.
    SkipAck,
}

impl Response {
    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn is_skip_ack(&self) -> bool {
        matches!(self, Response::SkipAck)
    }

    /// The delivery error, if any.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Response::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<errors::Result<()>> for Response {
    fn from(res: errors::Result<()>) -> Self {
        match res {
            Ok(()) => Response::Ack,
            Err(err) => Response::Error(err),
        }
    }
}
