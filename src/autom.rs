//! Multi-pattern product DFA used as the extraction pre-filter.
//!
//! Each extraction's automaton-dialect source compiles to its own anchored,
//! minimized dense DFA. Those are then combined into one product automaton
//! walked in a single pass per input line:
//!
//! - the combined alphabet is the mutual refinement of every sub-DFA's byte
//!   class partition, with a 256-entry lookup table mapping input bytes to
//!   combined class indices;
//! - a product state is the tuple of per-sub-DFA states, where a sub-DFA that
//!   has stepped into a dead state stays out permanently; states are
//!   discovered breadth-first and numbered densely in discovery order, id 0
//!   being the initial state;
//! - the all-dead tuple is the shared dead end (`-1` in the transition table),
//!   aborting the scan;
//! - a product state accepts the ascending set of sub-DFA indices that match
//!   at end of input.
//!
//! The matcher is immutable after construction and safe to share across
//! threads without synchronization.

use std::collections::{HashMap, VecDeque};

use regex_automata::{
    Anchored,
    dfa::{Automaton, StartKind, dense},
    util::primitives::StateID,
};

const NO_MATCH: i32 = -1;

#[derive(Debug)]
pub(crate) struct PolyMatcher {
    /// Input byte to combined equivalence class.
    alphabet: [u16; 256],
    /// Number of combined classes; row width of `transitions`.
    stride: usize,
    /// `state * stride + class` to next state id, or `NO_MATCH`.
    transitions: Vec<i32>,
    /// Per state: ascending indices of sub-patterns accepting at end of input.
    accept: Vec<Vec<usize>>,
}

impl PolyMatcher {
    /// Builds the product automaton from automaton-dialect sources, in
    /// priority order. Fails on sources the DFA engine rejects, and on
    /// patterns with no universal anchored start state (start-conditional
    /// assertions cannot be pre-filtered).
    pub fn new(patterns: &[String]) -> Result<Self, String> {
        let mut dfas: Vec<dense::DFA<Vec<u32>>> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let dfa = dense::Builder::new()
                .configure(dense::Config::new().start_kind(StartKind::Anchored).minimize(true))
                .build(pattern)
                .map_err(|e| format!("invalid automaton pattern {pattern:?}: {e}"))?;
            dfas.push(dfa);
        }

        let mut alphabet = [0u16; 256];
        let mut reps: Vec<u8> = Vec::new();
        {
            let mut keys: HashMap<Vec<u8>, u16> = HashMap::new();
            for byte in 0..=255u8 {
                let key: Vec<u8> = dfas.iter().map(|d| d.byte_classes().get(byte)).collect();
                let next = keys.len() as u16;
                let class = *keys.entry(key).or_insert(next);
                alphabet[byte as usize] = class;
                if class as usize == reps.len() {
                    reps.push(byte);
                }
            }
        }
        let stride = reps.len();

        let mut initial: Vec<Option<StateID>> = Vec::with_capacity(dfas.len());
        for (dfa, pattern) in dfas.iter().zip(patterns) {
            let start = dfa.universal_start_state(Anchored::Yes).ok_or_else(|| {
                format!(
                    "automaton pattern {pattern:?} has no universal anchored start state; \
                     look-behind assertions and explicit anchors are not supported"
                )
            })?;
            initial.push(Some(start));
        }

        let mut index: HashMap<Vec<Option<StateID>>, i32> = HashMap::new();
        let mut queue: VecDeque<Vec<Option<StateID>>> = VecDeque::new();
        index.insert(initial.clone(), 0);
        queue.push_back(initial);

        let mut transitions: Vec<i32> = Vec::new();
        let mut accept: Vec<Vec<usize>> = Vec::new();

        // FIFO discovery keeps popped order equal to id order, so transition
        // rows can simply be appended.
        while let Some(state) = queue.pop_front() {
            let mut acc = Vec::new();
            for (i, sub) in state.iter().enumerate() {
                if let Some(sid) = sub {
                    if dfas[i].is_match_state(dfas[i].next_eoi_state(*sid)) {
                        acc.push(i);
                    }
                }
            }
            accept.push(acc);

            for class in 0..stride {
                let byte = reps[class];
                let mut next: Vec<Option<StateID>> = Vec::with_capacity(state.len());
                let mut alive = false;
                for (i, sub) in state.iter().enumerate() {
                    let stepped = sub.and_then(|sid| {
                        let n = dfas[i].next_state(sid, byte);
                        if dfas[i].is_dead_state(n) || dfas[i].is_quit_state(n) {
                            None
                        } else {
                            Some(n)
                        }
                    });
                    alive |= stepped.is_some();
                    next.push(stepped);
                }
                let id = if !alive {
                    NO_MATCH
                } else if let Some(&id) = index.get(&next) {
                    id
                } else {
                    let id = index.len() as i32;
                    index.insert(next.clone(), id);
                    queue.push_back(next);
                    id
                };
                transitions.push(id);
            }
        }

        Ok(PolyMatcher { alphabet, stride, transitions, accept })
    }

    /// Runs the whole input through the automaton. Returns the matching
    /// sub-pattern indices in ascending (priority) order, empty if none.
    pub fn matches(&self, input: &str) -> &[usize] {
        let mut state: i32 = 0;
        for &byte in input.as_bytes() {
            let class = self.alphabet[byte as usize] as usize;
            state = self.transitions[state as usize * self.stride + class];
            if state == NO_MATCH {
                return &[];
            }
        }
        &self.accept[state as usize]
    }

    pub fn state_count(&self) -> usize {
        self.accept.len()
    }
}
