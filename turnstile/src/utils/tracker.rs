#![allow(unused)]

use crate::interrupt::Line;
use crate::task::{Id, Stage};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Submit,
    Resume,
    Release,
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Submit {
        id: Id,
        name: Option<String>,
    },
    Resume {
        id: Id,
        round: u64,
        stage: Stage,
    },
    Release {
        id: Id,
        stage: Stage,
    },
    Interrupt {
        line: Line,
        interrupted: Option<Id>,
    },
}

/// Records what the scheduler did so tests can assert on ordering.
#[derive(Debug)]
pub(crate) struct Tracker {
    calls: RefCell<HashMap<Method, Vec<Call>>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(Method::Submit, Vec::new());
        map.insert(Method::Resume, Vec::new());
        map.insert(Method::Release, Vec::new());
        map.insert(Method::Interrupt, Vec::new());

        Self {
            calls: RefCell::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .borrow_mut()
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .borrow()
            .get(method)
            .expect("method not found")
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.borrow().get(method).map_or(0, |calls| calls.len())
    }

    /// Ids of the resumed tasks, grouped by round.
    pub(crate) fn resumes_by_round(&self) -> Vec<Vec<Id>> {
        let mut rounds: Vec<Vec<Id>> = Vec::new();

        for call in self.get_calls(&Method::Resume) {
            if let Call::Resume { id, round, .. } = call {
                let idx = (round - 1) as usize;
                if rounds.len() <= idx {
                    rounds.resize_with(idx + 1, Vec::new);
                }
                rounds[idx].push(id);
            }
        }

        rounds
    }
}
