use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::evaluator::{AttrPathCompleteParams, AttrSetChannel, EvalError, PackageDescription, Reply};

/// Collect `# ^N` cursor markers from a Nix source.
///
/// A comment line containing `^N` marks the byte offset of the caret's column
/// on the line directly above it. Returns marker number -> offset.
pub fn parse_markers(src: &str) -> BTreeMap<u32, u32> {
    let mut markers = BTreeMap::new();
    let mut prev_line_start = 0u32;
    let mut line_start = 0u32;

    for line in src.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            for (col, _) in line.match_indices('^') {
                let digits: String = line[col + 1..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                if digits.is_empty() {
                    continue;
                }
                let num = digits.parse().expect("marker number");
                markers.insert(num, prev_line_start + col as u32);
            }
        }
        prev_line_start = line_start;
        line_start += line.len() as u32;
    }
    markers
}

/// An in-memory evaluator answering from fixed tables.
///
/// `attrpathComplete` returns every name registered for the scope, ignoring
/// the prefix, so callers' own filtering is exercised. Every query is
/// recorded.
#[derive(Default)]
pub struct FakeEvaluator {
    names: HashMap<Vec<String>, Vec<String>>,
    infos: HashMap<Vec<String>, PackageDescription>,
    failing: bool,
    threaded: bool,
    exprs: Mutex<Vec<String>>,
    complete_queries: Mutex<Vec<AttrPathCompleteParams>>,
    info_queries: Mutex<Vec<Vec<String>>>,
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(mut self, scope: &[&str], names: &[&str]) -> Self {
        self.names.insert(owned(scope), owned(names));
        self
    }

    pub fn with_info(mut self, path: &[&str], desc: PackageDescription) -> Self {
        self.infos.insert(owned(path), desc);
        self
    }

    /// Every query fails with an evaluator error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Reply from a separate thread instead of inside the call.
    pub fn threaded(mut self) -> Self {
        self.threaded = true;
        self
    }

    pub fn exprs(&self) -> Vec<String> {
        self.exprs.lock().clone()
    }

    pub fn complete_queries(&self) -> Vec<AttrPathCompleteParams> {
        self.complete_queries.lock().clone()
    }

    pub fn info_queries(&self) -> Vec<Vec<String>> {
        self.info_queries.lock().clone()
    }

    fn answer<T: Send + 'static>(&self, result: Result<T, EvalError>, reply: Reply<T>) {
        if self.threaded {
            std::thread::spawn(move || reply(result));
        } else {
            reply(result);
        }
    }

    fn failure() -> EvalError {
        EvalError::Remote {
            code: -32000,
            message: "error: evaluation aborted".to_string(),
        }
    }
}

impl AttrSetChannel for FakeEvaluator {
    fn eval_expr(&self, expr: String, reply: Reply<()>) {
        self.exprs.lock().push(expr);
        self.answer(Ok(()), reply);
    }

    fn attrpath_complete(&self, params: AttrPathCompleteParams, reply: Reply<Vec<String>>) {
        let result = if self.failing {
            Err(Self::failure())
        } else {
            Ok(self.names.get(&params.scope).cloned().unwrap_or_default())
        };
        self.complete_queries.lock().push(params);
        self.answer(result, reply);
    }

    fn attrpath_info(&self, path: Vec<String>, reply: Reply<PackageDescription>) {
        let result = if self.failing {
            Err(Self::failure())
        } else {
            self.infos.get(&path).cloned().ok_or_else(|| EvalError::Remote {
                code: -32000,
                message: format!("attribute '{}' missing", path.join(".")),
            })
        };
        self.info_queries.lock().push(path);
        self.answer(result, reply);
    }
}
