use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::hidden::HiddenDocument;
use crate::live_dom::LiveDom;
use crate::translator::{MutationTranslator, StreamStats};
use crate::unit::{PacketSink, StreamItem};

const TARGET: &str = "html_stream.stream";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    Open,
    Finished,
    Failed,
}

/// Incremental parser that turns markup fragments into replayable packets.
///
/// Every `write` feeds the engine and then runs one checkpoint over the
/// mutations it caused. `finish` closes the input, flushes what is still
/// held back and pushes [`StreamItem::End`]; it is also the way to stop early
/// while keeping what was parsed so far. `fail` discards held-back output and
/// pushes [`StreamItem::Failed`]. The stream owns single-threaded state and
/// must stay on the thread that created it; its sink may forward items
/// anywhere.
pub struct ParserStream<S: PacketSink> {
    document: HiddenDocument,
    translator: MutationTranslator,
    sink: S,
    state: StreamState,
}

impl<S: PacketSink> ParserStream<S> {
    pub fn new(config: StreamConfig, sink: S) -> Result<Self, StreamError> {
        let document = HiddenDocument::new(&config)?;
        log::debug!(
            target: TARGET,
            "stream opened: batch_size={} scripting={}",
            config.batch_size,
            config.scripting_enabled
        );
        Ok(Self {
            document,
            translator: MutationTranslator::new(&config),
            sink,
            state: StreamState::Open,
        })
    }

    pub fn write(&mut self, fragment: &str) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.document.write(fragment)?;
        self.translator.stats_mut().fragments += 1;
        log::trace!(target: TARGET, "fragment of {} bytes", fragment.len());
        self.checkpoint()
    }

    /// Close the input and flush everything still held back.
    pub fn finish(&mut self) -> Result<StreamStats, StreamError> {
        self.ensure_open()?;
        self.document.close();
        self.checkpoint()?;
        let result = {
            let mut dom = self.document.dom_mut();
            self.translator.finish(&mut dom, &mut self.sink)
        };
        if let Err(err) = result {
            self.poison(&err);
            return Err(err);
        }
        self.sink.push(StreamItem::End);
        self.state = StreamState::Finished;
        let stats = self.translator.stats();
        log::debug!(
            target: TARGET,
            "stream finished: fragments={} units={} packets={} moves={} dropped={}",
            stats.fragments,
            stats.units,
            stats.packets,
            stats.moves,
            stats.dropped_removed
        );
        Ok(stats)
    }

    /// Abort with `reason`; held-back output is dropped.
    pub fn fail(&mut self, reason: &str) {
        if self.state != StreamState::Open {
            return;
        }
        log::debug!(target: TARGET, "stream failed: {reason}");
        self.document.abandon();
        self.translator.discard();
        self.sink.push(StreamItem::Failed(reason.to_string()));
        self.state = StreamState::Failed;
    }

    /// Apply out-of-band changes to the live tree (as a script would) and
    /// translate them immediately.
    pub fn mutate_live<R>(&mut self, f: impl FnOnce(&mut LiveDom) -> R) -> Result<R, StreamError> {
        self.ensure_open()?;
        let out = f(&mut self.document.dom_mut());
        self.checkpoint()?;
        Ok(out)
    }

    pub fn with_live<R>(&self, f: impl FnOnce(&LiveDom) -> R) -> R {
        f(&self.document.dom())
    }

    pub fn stats(&self) -> StreamStats {
        self.translator.stats()
    }

    pub fn translator(&self) -> &MutationTranslator {
        &self.translator
    }

    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        match self.state {
            StreamState::Open => Ok(()),
            StreamState::Finished | StreamState::Failed => Err(StreamError::Closed),
        }
    }

    fn checkpoint(&mut self) -> Result<(), StreamError> {
        if !self.document.dom().has_pending_records() {
            return Ok(());
        }
        let records = self.document.take_records();
        self.translator.stats_mut().checkpoints += 1;
        log::trace!(target: TARGET, "checkpoint with {} records", records.len());
        let result = {
            let mut dom = self.document.dom_mut();
            self.translator.process_batch(&mut dom, records, &mut self.sink)
        };
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    fn poison(&mut self, err: &StreamError) {
        log::error!(target: TARGET, "stream poisoned: {err}");
        self.fail(&err.to_string());
    }
}

/// Drive a whole fragment source through a stream.
///
/// A source error fails the stream and is returned as
/// [`StreamError::Source`]; everything already emitted stays emitted.
pub fn run_stream<I, E, S>(fragments: I, config: StreamConfig, sink: S) -> Result<StreamStats, StreamError>
where
    I: IntoIterator<Item = Result<String, E>>,
    E: std::fmt::Display,
    S: PacketSink,
{
    let mut stream = ParserStream::new(config, sink)?;
    for fragment in fragments {
        match fragment {
            Ok(fragment) => stream.write(&fragment)?,
            Err(err) => {
                let reason = err.to_string();
                stream.fail(&reason);
                return Err(StreamError::Source(reason));
            }
        }
    }
    stream.finish()
}
