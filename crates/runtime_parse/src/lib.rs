use bus::{ParseCommand, ParseEvent, StreamId};
use html_stream::{PacketSink, ParserStream, StreamItem};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

const TARGET: &str = "runtime_parse";

/// Forwards one stream's items as bus events.
struct EventSink {
    stream_id: StreamId,
    evt_tx: Sender<ParseEvent>,
}

impl PacketSink for EventSink {
    fn push(&mut self, item: StreamItem) {
        let stream_id = self.stream_id;
        if self.evt_tx.send(ParseEvent::Item { stream_id, item }).is_err() {
            log::warn!(target: TARGET, "event receiver dropped; stream {stream_id} item discarded");
        }
    }
}

type Streams = HashMap<StreamId, ParserStream<EventSink>>;

/// Spawn the parse worker. It runs until every command sender is gone; any
/// stream still open at that point is failed.
pub fn start_parse_runtime(cmd_rx: Receiver<ParseCommand>, evt_tx: Sender<ParseEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut streams: Streams = HashMap::new();
        log::debug!(target: TARGET, "parse runtime started");

        while let Ok(cmd) = cmd_rx.recv() {
            handle_command(&mut streams, &evt_tx, cmd);
        }

        for (stream_id, mut stream) in streams.drain() {
            log::warn!(target: TARGET, "command channel closed with stream {stream_id} open");
            stream.fail("parse runtime shut down");
        }
        log::debug!(target: TARGET, "parse runtime stopped");
    })
}

fn handle_command(streams: &mut Streams, evt_tx: &Sender<ParseEvent>, cmd: ParseCommand) {
    match cmd {
        ParseCommand::Start { stream_id, config } => {
            if streams.contains_key(&stream_id) {
                reject(evt_tx, stream_id, "stream already started");
                return;
            }
            let sink = EventSink {
                stream_id,
                evt_tx: evt_tx.clone(),
            };
            match ParserStream::new(config, sink) {
                Ok(stream) => {
                    log::debug!(target: TARGET, "stream {stream_id} started");
                    streams.insert(stream_id, stream);
                }
                Err(err) => {
                    log::error!(target: TARGET, "stream {stream_id} could not start: {err}");
                    send(evt_tx, ParseEvent::Item {
                        stream_id,
                        item: StreamItem::Failed(err.to_string()),
                    });
                }
            }
        }
        ParseCommand::Fragment { stream_id, text } => {
            let Some(stream) = streams.get_mut(&stream_id) else {
                reject(evt_tx, stream_id, "fragment for unknown stream");
                return;
            };
            if let Err(err) = stream.write(&text) {
                // The stream has already pushed its failure marker.
                log::debug!(target: TARGET, "stream {stream_id} failed: {err}");
                streams.remove(&stream_id);
            }
        }
        ParseCommand::Done { stream_id } | ParseCommand::Cancel { stream_id } => {
            let Some(mut stream) = streams.remove(&stream_id) else {
                reject(evt_tx, stream_id, "close for unknown stream");
                return;
            };
            finish(evt_tx, stream_id, &mut stream);
        }
        ParseCommand::SourceFailed { stream_id, error } => {
            let Some(mut stream) = streams.remove(&stream_id) else {
                reject(evt_tx, stream_id, "failure for unknown stream");
                return;
            };
            log::debug!(target: TARGET, "stream {stream_id} source failed: {error}");
            stream.fail(&error);
        }
    }
}

fn finish(evt_tx: &Sender<ParseEvent>, stream_id: StreamId, stream: &mut ParserStream<EventSink>) {
    match stream.finish() {
        Ok(stats) => {
            log::debug!(
                target: TARGET,
                "stream {stream_id} finished: units={} packets={}",
                stats.units,
                stats.packets
            );
            send(evt_tx, ParseEvent::Finished { stream_id, stats });
        }
        Err(err) => log::debug!(target: TARGET, "stream {stream_id} failed at close: {err}"),
    }
}

fn reject(evt_tx: &Sender<ParseEvent>, stream_id: StreamId, reason: &str) {
    log::warn!(target: TARGET, "stream {stream_id}: {reason}");
    send(evt_tx, ParseEvent::Rejected {
        stream_id,
        reason: reason.to_string(),
    });
}

fn send(evt_tx: &Sender<ParseEvent>, event: ParseEvent) {
    if evt_tx.send(event).is_err() {
        log::warn!(target: TARGET, "event receiver dropped");
    }
}
