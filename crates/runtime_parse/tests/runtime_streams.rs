use bus::{Bus, ParseCommand, ParseEvent, StreamId};
use dom_replay::{ReplayError, ReplaySink, ReplayTree};
use html_stream::snapshot::{DomSnapshotOptions, assert_dom_eq};
use html_stream::test_harness::ChunkPlan;
use html_stream::{StreamConfig, StreamItem, parse_to_node};
use runtime_parse::start_parse_runtime;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Send `commands`, close the command side and collect every event.
fn run_commands(commands: Vec<ParseCommand>) -> Vec<ParseEvent> {
    let (bus, cmd_rx) = Bus::new();
    let Bus {
        cmd_tx,
        evt_rx,
        evt_tx,
    } = bus;
    let handle = start_parse_runtime(cmd_rx, evt_tx);
    for cmd in commands {
        cmd_tx.send(cmd).unwrap();
    }
    drop(cmd_tx);
    handle.join().unwrap();
    evt_rx.try_iter().collect()
}

fn items_for(events: &[ParseEvent], id: StreamId) -> Vec<StreamItem> {
    events
        .iter()
        .filter_map(|event| match event {
            ParseEvent::Item { stream_id, item } if *stream_id == id => Some(item.clone()),
            _ => None,
        })
        .collect()
}

fn fragments(stream_id: StreamId, input: &str, size: usize) -> Vec<ParseCommand> {
    ChunkPlan::fixed(size)
        .chunks(input)
        .into_iter()
        .map(|text| ParseCommand::Fragment {
            stream_id,
            text: text.to_string(),
        })
        .collect()
}

fn start(stream_id: StreamId, batch: usize) -> ParseCommand {
    ParseCommand::Start {
        stream_id,
        config: StreamConfig::default().with_batch_size(NonZeroUsize::new(batch).unwrap()),
    }
}

#[test]
fn interleaved_streams_replay_independently() {
    let inputs: HashMap<StreamId, &str> = HashMap::from([
        (1, "<div>He<b>llo</b> world</div><p>one"),
        (2, "<table>x<tr><td>cell</td></tr></table><template><i>t</i></template>"),
    ]);
    let mut commands = vec![start(1, 1), start(2, 4)];
    let first = fragments(1, inputs[&1], 3);
    let second = fragments(2, inputs[&2], 5);
    let mut first = first.into_iter();
    let mut second = second.into_iter();
    loop {
        let a = first.next();
        let b = second.next();
        if a.is_none() && b.is_none() {
            break;
        }
        commands.extend(a);
        commands.extend(b);
    }
    commands.push(ParseCommand::Done { stream_id: 2 });
    commands.push(ParseCommand::Done { stream_id: 1 });

    let events = run_commands(commands);
    for (id, input) in &inputs {
        let tree = dom_replay::replay_items(items_for(&events, *id)).unwrap();
        assert_dom_eq(
            &parse_to_node(input).unwrap(),
            &tree.materialize(),
            DomSnapshotOptions::default(),
        );
        let finished = events
            .iter()
            .filter(|event| matches!(event, ParseEvent::Finished { stream_id, .. } if stream_id == id))
            .count();
        assert_eq!(finished, 1);
    }
}

#[test]
fn cancel_flushes_held_text() {
    let mut commands = vec![start(7, 16)];
    commands.extend(fragments(7, "<p>partial te", 64));
    commands.push(ParseCommand::Cancel { stream_id: 7 });

    let events = run_commands(commands);
    let items = items_for(&events, 7);
    assert_eq!(items.last(), Some(&StreamItem::End));
    let tree = dom_replay::replay_items(items).unwrap().materialize();
    assert_eq!(tree.text_content(), "partial te");
}

#[test]
fn source_failure_reaches_the_consumer() {
    let mut commands = vec![start(3, 1)];
    commands.extend(fragments(3, "<ul><li>a<li>b", 4));
    commands.push(ParseCommand::SourceFailed {
        stream_id: 3,
        error: "connection reset".to_string(),
    });

    let events = run_commands(commands);
    assert!(!events.iter().any(|event| matches!(event, ParseEvent::Finished { .. })));
    let mut sink = ReplaySink::new(ReplayTree::new());
    let err = sink.replay_all(items_for(&events, 3)).unwrap_err();
    assert_eq!(err, ReplayError::StreamFailed("connection reset".to_string()));
    let partial = sink.into_target().materialize();
    assert_eq!(partial.children().len(), 1);
}

#[test]
fn commands_for_unknown_streams_are_rejected() {
    let events = run_commands(vec![
        ParseCommand::Fragment {
            stream_id: 9,
            text: "<p>".to_string(),
        },
        start(9, 1),
        start(9, 1),
        ParseCommand::Done { stream_id: 9 },
        ParseCommand::Done { stream_id: 9 },
    ]);
    let rejected: Vec<&ParseEvent> = events
        .iter()
        .filter(|event| matches!(event, ParseEvent::Rejected { .. }))
        .collect();
    assert_eq!(rejected.len(), 3);
    assert!(rejected.iter().all(|event| event.stream_id() == 9));
    assert_eq!(items_for(&events, 9), vec![StreamItem::End]);
}

#[test]
fn shutdown_fails_open_streams() {
    let mut commands = vec![start(5, 1)];
    commands.extend(fragments(5, "<div>never closed", 8));
    let events = run_commands(commands);
    let items = items_for(&events, 5);
    assert!(matches!(items.last(), Some(StreamItem::Failed(_))));
}
