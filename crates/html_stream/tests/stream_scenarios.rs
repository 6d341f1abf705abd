use html_stream::{
    EmissionUnit, LiveId, MirrorId, MirrorKind, ParserStream, StreamConfig, StreamItem, flatten_units,
};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

fn config(batch: usize) -> StreamConfig {
    StreamConfig::default().with_batch_size(NonZeroUsize::new(batch).unwrap())
}

fn run(chunks: &[&str], batch: usize) -> Vec<StreamItem> {
    let mut stream = ParserStream::new(config(batch), Vec::new()).unwrap();
    for chunk in chunks {
        stream.write(chunk).unwrap();
    }
    stream.finish().unwrap();
    stream.into_sink()
}

fn label(unit: &EmissionUnit) -> String {
    match &unit.node.kind {
        MirrorKind::Text(text) => format!("{text:?}"),
        MirrorKind::Element(element) | MirrorKind::Script(element) => element.name.to_string(),
        MirrorKind::Template { .. } => "template".to_string(),
        MirrorKind::Other(other) => format!("{other:?}"),
    }
}

fn packet_count(items: &[StreamItem]) -> usize {
    items
        .iter()
        .filter(|item| matches!(item, StreamItem::Packet(_)))
        .count()
}

/// Every mirror id maps to a single node value across the whole stream.
fn assert_no_duplicate_mirrors(units: &[EmissionUnit]) {
    let mut seen: HashMap<MirrorId, &EmissionUnit> = HashMap::new();
    for unit in units {
        if let Some(first) = seen.get(&unit.node.id) {
            assert_eq!(first.node, unit.node, "mirror {:?} changed identity", unit.node.id);
        } else {
            seen.insert(unit.node.id, unit);
        }
    }
}

/// Parents and anchors only refer to mirrors that were already delivered.
fn assert_references_resolve(units: &[EmissionUnit]) {
    let mut known: HashSet<MirrorId> = HashSet::new();
    for unit in units {
        if let Some(parent) = unit.parent {
            assert!(known.contains(&parent), "unknown parent {parent:?}");
        }
        if let Some(next) = unit.next_sibling {
            assert!(known.contains(&next), "unknown sibling {next:?}");
        }
        known.insert(unit.node.id);
        if let MirrorKind::Template { content, .. } = unit.node.kind {
            known.insert(content);
        }
    }
}

#[test]
fn three_fragment_div_streams_in_order() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<div>He").unwrap();
    assert_eq!(packet_count(stream.sink()), 1);
    stream.write("llo <b>Wor").unwrap();
    assert_eq!(packet_count(stream.sink()), 3);
    stream.write("ld</b></div>").unwrap();
    assert_eq!(packet_count(stream.sink()), 3);
    let stats = stream.finish().unwrap();
    let items = stream.into_sink();
    assert_eq!(items.last(), Some(&StreamItem::End));

    let units = flatten_units(&items);
    let labels: Vec<String> = units.iter().map(label).collect();
    assert_eq!(labels, vec!["div", "\"Hello \"", "b", "\"World\""]);
    let div = units[0].node.id;
    let b = units[2].node.id;
    assert_eq!(units[0].parent, None);
    assert_eq!(units[1].parent, Some(div));
    assert_eq!(units[2].parent, Some(div));
    assert_eq!(units[3].parent, Some(b));
    assert!(units.iter().all(|unit| unit.next_sibling.is_none()));
    assert_eq!(stats.units, 4);
    assert_eq!(stats.fragments, 3);
}

#[test]
fn text_is_held_until_a_later_node() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<p>abc").unwrap();
    assert_eq!(flatten_units(stream.sink()).len(), 1);
    stream.write("def").unwrap();
    assert_eq!(flatten_units(stream.sink()).len(), 1);
    stream.write("<!--c-->").unwrap();
    let units = flatten_units(stream.sink());
    assert_eq!(units.len(), 3);
    assert_eq!(units[1].node.kind, MirrorKind::Text("abcdef".to_string()));
    assert!(matches!(units[2].node.kind, MirrorKind::Other(_)));
}

#[test]
fn trailing_text_is_flushed_at_end() {
    let items = run(&["plain ", "text"], 1);
    let units = flatten_units(&items);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].node.kind, MirrorKind::Text("plain text".to_string()));
    assert_eq!(units[0].parent, None);
}

#[test]
fn template_content_is_rooted_at_its_fragment() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<template><span>x</span>").unwrap();
    stream.write("<i>y</i></template><p>z</p>").unwrap();

    let units = flatten_units(stream.sink());
    let MirrorKind::Template { content, .. } = units[0].node.kind else {
        panic!("first unit should be the template, got {:?}", units[0]);
    };
    assert_eq!(units[0].parent, None);
    let span = units.iter().find(|u| label(u) == "span").unwrap();
    let italic = units.iter().find(|u| label(u) == "i").unwrap();
    assert_eq!(span.parent, Some(content));
    assert_eq!(italic.parent, Some(content));

    // Out-of-band insertion into the closed template's content.
    let template = stream.with_live(|dom| dom.children(dom.root().unwrap())[0]);
    stream
        .mutate_live(|dom| {
            let fragment = dom.template_contents(template).unwrap();
            let em = dom.create_element(html_stream::live_dom::html_name("em"), Vec::new(), false);
            dom.append(fragment, em);
        })
        .unwrap();
    stream.finish().unwrap();

    let units = flatten_units(stream.sink());
    let em = units.iter().find(|u| label(u) == "em").unwrap();
    assert_eq!(em.parent, Some(content));
    assert_references_resolve(&units);
    assert_no_duplicate_mirrors(&units);
}

#[test]
fn foster_parented_text_lands_before_the_table() {
    for chunks in [
        vec!["<table>text<tr><td>cell</td></tr></table>"],
        vec!["<table>te", "xt<tr><td>ce", "ll</td></tr></table>"],
        vec!["<table>", "text", "<tr>", "<td>cell</td></tr></table>"],
    ] {
        let items = run(&chunks, 1);
        let units = flatten_units(&items);
        assert_no_duplicate_mirrors(&units);
        assert_references_resolve(&units);

        let table = units.iter().find(|u| label(u) == "table").unwrap().node.id;
        let text_units: Vec<&EmissionUnit> = units.iter().filter(|u| label(u) == "\"text\"").collect();
        assert!(!text_units.is_empty(), "chunks {chunks:?}");
        let last = text_units[text_units.len() - 1];
        assert_eq!(last.parent, None, "chunks {chunks:?}");
        assert_eq!(last.next_sibling, Some(table), "chunks {chunks:?}");
    }
}

#[test]
fn foster_text_grown_after_flush_is_extended_before_the_table() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<table>a<tr>").unwrap();
    stream.write("</tr>b</table>").unwrap();
    let stats = stream.finish().unwrap();
    assert_eq!(stats.text_extensions, 1);

    let units = flatten_units(stream.sink());
    assert_no_duplicate_mirrors(&units);
    assert_references_resolve(&units);
    let table = units.iter().find(|u| label(u) == "table").unwrap().node.id;
    let a = units.iter().find(|u| label(u) == "\"a\"").unwrap();
    let b = units.iter().find(|u| label(u) == "\"b\"").unwrap();
    assert_ne!(a.node.id, b.node.id);
    for unit in [a, b] {
        assert_eq!(unit.parent, None);
        assert_eq!(unit.next_sibling, Some(table));
    }
}

#[test]
fn single_character_fragments_keep_all_foster_text() {
    let input = "<table>a<tr></tr>b</table>";
    let chunks: Vec<&str> = (0..input.len()).map(|i| &input[i..i + 1]).collect();
    let items = run(&chunks, 1);
    let units = flatten_units(&items);
    assert_no_duplicate_mirrors(&units);
    assert_references_resolve(&units);
    let mut seen = HashSet::new();
    let top_level_text: String = units
        .iter()
        .filter(|u| u.parent.is_none() && seen.insert(u.node.id))
        .filter_map(|u| match &u.node.kind {
            MirrorKind::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(top_level_text, "ab");
}

#[test]
fn adoption_agency_clone_is_placed_under_the_block() {
    for chunks in [vec!["<b>1<p>2</b>3</p>"], vec!["<b>1<p>2", "</b>3</p>"]] {
        let items = run(&chunks, 1);
        let units = flatten_units(&items);
        assert_no_duplicate_mirrors(&units);
        assert_references_resolve(&units);

        let p = units.iter().rev().find(|u| label(u) == "p").unwrap();
        assert_eq!(p.parent, None);
        let b_units: Vec<&EmissionUnit> = units.iter().filter(|u| label(u) == "b").collect();
        let ids: HashSet<MirrorId> = b_units.iter().map(|u| u.node.id).collect();
        assert_eq!(ids.len(), 2, "original and clone, chunks {chunks:?}");
        assert!(b_units.iter().any(|u| u.parent == Some(p.node.id)));
    }
}

#[test]
fn batching_preserves_the_unit_sequence() {
    let chunks = ["<ul><li>one", "<li>two<li>th", "ree</ul><p>tail"];
    let reference = flatten_units(&run(&chunks, 1));
    for batch in [2usize, 3, 64] {
        let items = run(&chunks, batch);
        assert_eq!(flatten_units(&items), reference, "batch {batch}");
        let sizes: Vec<usize> = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Packet(packet) => Some(packet.units.len()),
                _ => None,
            })
            .collect();
        let (last, full) = sizes.split_last().unwrap();
        assert!(full.iter().all(|&size| size == batch), "batch {batch}: {sizes:?}");
        assert!(*last <= batch);
    }
    let single = run(&chunks, 1);
    assert_eq!(packet_count(&single), reference.len());
}

#[test]
fn removed_node_never_readded_produces_nothing_more() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<div id=a>x</div><p>y").unwrap();
    let div_live: LiveId = stream.with_live(|dom| dom.children(dom.root().unwrap())[0]);
    let div_mirror = stream.translator().mirror().get(div_live).unwrap().id;
    let before = flatten_units(stream.sink()).len();

    stream.mutate_live(|dom| dom.detach(div_live)).unwrap();
    assert_eq!(flatten_units(stream.sink()).len(), before);
    let stats = stream.finish().unwrap();
    assert_eq!(stats.dropped_removed, 1);

    let units = flatten_units(stream.sink());
    assert!(units[before..].iter().all(|u| u.node.id != div_mirror && u.parent != Some(div_mirror)));
    assert_eq!(units.len(), before + 1);
}

#[test]
fn scripts_are_mirrored_unstarted() {
    let mut stream = ParserStream::new(config(1), Vec::new()).unwrap();
    stream.write("<script src=app.js>var a = 1;</script><p>after").unwrap();
    let script_live = stream.with_live(|dom| dom.children(dom.root().unwrap())[0]);
    assert!(stream.with_live(|dom| dom.is_script_started(script_live)));
    stream.finish().unwrap();

    let units = flatten_units(stream.sink());
    match &units[0].node.kind {
        MirrorKind::Script(element) => assert_eq!(element.attribute("src"), Some("app.js")),
        other => panic!("expected script, got {other:?}"),
    }
    assert_eq!(units[1].node.kind, MirrorKind::Text("var a = 1;".to_string()));
}

#[test]
fn no_records_means_no_output() {
    let items = run(&["", ""], 1);
    assert_eq!(items, vec![StreamItem::End]);
}
