use html_stream::{StreamConfig, StreamItem, StreamStats};
use std::sync::mpsc::{self, Receiver, Sender};

/// Identifies one parse pipeline inside a runtime.
pub type StreamId = u64;

#[derive(Debug)]
pub enum ParseCommand {
    Start {
        stream_id: StreamId,
        config: StreamConfig,
    },
    Fragment {
        stream_id: StreamId,
        text: String,
    },
    /// End of input: flush and close.
    Done {
        stream_id: StreamId,
    },
    /// Abort from the consumer side; whatever is pending is still flushed.
    Cancel {
        stream_id: StreamId,
    },
    /// The fragment source failed upstream.
    SourceFailed {
        stream_id: StreamId,
        error: String,
    },
}

impl ParseCommand {
    pub fn stream_id(&self) -> StreamId {
        match self {
            ParseCommand::Start { stream_id, .. }
            | ParseCommand::Fragment { stream_id, .. }
            | ParseCommand::Done { stream_id }
            | ParseCommand::Cancel { stream_id }
            | ParseCommand::SourceFailed { stream_id, .. } => *stream_id,
        }
    }
}

#[derive(Debug)]
pub enum ParseEvent {
    // Packets, end marker and failure marker, in stream order
    Item {
        stream_id: StreamId,
        item: StreamItem,
    },
    Finished {
        stream_id: StreamId,
        stats: StreamStats,
    },
    // Command for a stream the runtime does not know
    Rejected {
        stream_id: StreamId,
        reason: String,
    },
}

impl ParseEvent {
    pub fn stream_id(&self) -> StreamId {
        match self {
            ParseEvent::Item { stream_id, .. }
            | ParseEvent::Finished { stream_id, .. }
            | ParseEvent::Rejected { stream_id, .. } => *stream_id,
        }
    }
}

pub struct Bus {
    pub cmd_tx: Sender<ParseCommand>,
    pub evt_rx: Receiver<ParseEvent>,
    pub evt_tx: Sender<ParseEvent>, // shareable for runtimes
}

impl Bus {
    /// Channel pair plus the command receiver a runtime should own.
    pub fn new() -> (Self, Receiver<ParseCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        (
            Self {
                cmd_tx,
                evt_rx,
                evt_tx,
            },
            cmd_rx,
        )
    }
}
