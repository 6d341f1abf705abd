//! The off-screen document the engine parses into.

use crate::config::StreamConfig;
use crate::error::{InvariantViolation, StreamError};
use crate::live_dom::{LiveDom, MutationRecord, html_name};
use crate::sink::EngineSink;
use html5ever::driver::Parser;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tokenizer::TokenizerOpts;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, parse_fragment};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Parses in template context, so the engine starts in "in template"
/// insertion mode under a synthetic `html` root and every later node lands
/// beneath that root.
pub struct HiddenDocument {
    dom: Rc<RefCell<LiveDom>>,
    parser: Option<Parser<EngineSink>>,
}

impl HiddenDocument {
    pub fn new(config: &StreamConfig) -> Result<Self, StreamError> {
        let dom = Rc::new(RefCell::new(LiveDom::new()));
        let opts = ParseOpts {
            tokenizer: TokenizerOpts {
                exact_errors: config.exact_errors,
                ..TokenizerOpts::default()
            },
            tree_builder: TreeBuilderOpts {
                exact_errors: config.exact_errors,
                scripting_enabled: config.scripting_enabled,
                ..TreeBuilderOpts::default()
            },
        };
        let parser = parse_fragment(
            EngineSink::new(Rc::clone(&dom)),
            opts,
            html_name("template"),
            Vec::new(),
        );
        if dom.borrow().root().is_none() {
            return Err(InvariantViolation::MissingParseRoot.into());
        }
        Ok(Self {
            dom,
            parser: Some(parser),
        })
    }

    pub fn write(&mut self, fragment: &str) -> Result<(), StreamError> {
        let parser = self.parser.as_mut().ok_or(StreamError::Closed)?;
        parser.process(StrTendril::from_slice(fragment));
        Ok(())
    }

    /// Signal end of input; the engine pops its open elements.
    pub fn close(&mut self) {
        if let Some(parser) = self.parser.take() {
            parser.finish();
        }
    }

    /// Drop the engine without letting it finish the tree.
    pub fn abandon(&mut self) {
        self.parser = None;
    }

    pub fn is_open(&self) -> bool {
        self.parser.is_some()
    }

    pub fn take_records(&self) -> Vec<MutationRecord> {
        self.dom.borrow_mut().take_records()
    }

    pub fn dom(&self) -> Ref<'_, LiveDom> {
        self.dom.borrow()
    }

    pub fn dom_mut(&self) -> RefMut<'_, LiveDom> {
        self.dom.borrow_mut()
    }
}
