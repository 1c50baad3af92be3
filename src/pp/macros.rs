//! Macro definitions.
//!
//! Parameter references are resolved to indices when the macro is defined,
//! so expansion substitutes by index without a name lookup per token.

use super::token::{tokens_to_text, PTok};

#[derive(Clone, Debug, PartialEq)]
pub struct Macro {
    /// `None` for object-like macros.
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    /// Body with [`PTok::Arg`] and [`PTok::Paste`] markers in place,
    /// whitespace trimmed from both ends.
    pub body: Vec<PTok>,
}

/// Name of the implicit variadic parameter.
pub const VA_ARGS: &str = "__VA_ARGS__";

impl Macro {
    /// Object-like macro from already-lexed body tokens.
    pub fn object(body: Vec<PTok>) -> Self {
        let mut resolved = Vec::with_capacity(body.len());
        for token in trim(body) {
            if token == PTok::Punct("##") {
                while resolved.last().is_some_and(PTok::is_space) {
                    resolved.pop();
                }
                resolved.push(PTok::Paste);
            } else if resolved.last() == Some(&PTok::Paste) && token.is_space() {
                // paste binds through whitespace
            } else {
                resolved.push(token);
            }
        }
        Self {
            params: None,
            variadic: false,
            body: resolved,
        }
    }

    /// Function-like macro. `#param` and `##` in the body are turned into
    /// markers; `#` before anything that is not a parameter is left alone
    /// (GLSL sources contain no stray `#` inside macro bodies, but the
    /// preprocessor should not lose text over it).
    pub fn function(params: Vec<String>, variadic: bool, body: Vec<PTok>) -> Self {
        let param_index = |name: &str| {
            if variadic && name == VA_ARGS {
                return Some(params.len());
            }
            params.iter().position(|p| p == name)
        };

        let body = trim(body);
        let mut resolved = Vec::with_capacity(body.len());
        let mut iter = body.into_iter().peekable();
        while let Some(token) = iter.next() {
            match token {
                PTok::Word(name) => match param_index(&name) {
                    Some(index) => resolved.push(PTok::Arg {
                        index,
                        stringize: false,
                    }),
                    None => resolved.push(PTok::Word(name)),
                },
                PTok::Punct("##") => {
                    // paste binds through whitespace on both sides
                    while resolved.last().is_some_and(PTok::is_space) {
                        resolved.pop();
                    }
                    while iter.peek().is_some_and(PTok::is_space) {
                        iter.next();
                    }
                    resolved.push(PTok::Paste);
                }
                PTok::Punct("#") => {
                    let mut lookahead = iter.clone();
                    while lookahead.peek().is_some_and(PTok::is_space) {
                        lookahead.next();
                    }
                    let stringized = lookahead
                        .peek()
                        .and_then(|t| t.as_word())
                        .and_then(param_index);
                    match stringized {
                        Some(index) => {
                            iter = lookahead;
                            iter.next();
                            resolved.push(PTok::Arg {
                                index,
                                stringize: true,
                            });
                        }
                        None => resolved.push(PTok::Punct("#")),
                    }
                }
                other => resolved.push(other),
            }
        }

        Self {
            params: Some(params),
            variadic,
            body: resolved,
        }
    }

    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    /// Declared parameter count, the variadic tail included.
    pub fn arity(&self) -> usize {
        let declared = self.params.as_ref().map_or(0, Vec::len);
        declared + usize::from(self.variadic)
    }

    /// Canonical body text, used to diff definitions across a run.
    pub fn body_text(&self) -> String {
        tokens_to_text(&self.body)
    }
}

fn trim(mut tokens: Vec<PTok>) -> Vec<PTok> {
    while tokens.first().is_some_and(PTok::is_space) {
        tokens.remove(0);
    }
    while tokens.last().is_some_and(PTok::is_space) {
        tokens.pop();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::super::token::{PLexer, PTok};
    use super::Macro;

    fn body(source: &str) -> Vec<PTok> {
        PLexer::run(source).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn params_resolved_to_indices() {
        let m = Macro::function(vec!["a".into(), "b".into()], false, body("((a) + (b))"));
        let args: Vec<usize> = m
            .body
            .iter()
            .filter_map(|t| match t {
                PTok::Arg { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(args, vec![0, 1]);
    }

    #[test]
    fn stringize_marker() {
        let m = Macro::function(vec!["x".into()], false, body("# x"));
        assert_eq!(
            m.body,
            vec![PTok::Arg {
                index: 0,
                stringize: true
            }]
        );
    }

    #[test]
    fn paste_strips_surrounding_space() {
        let m = Macro::function(vec!["a".into(), "b".into()], false, body("a ## b"));
        assert_eq!(
            m.body,
            vec![
                PTok::Arg {
                    index: 0,
                    stringize: false
                },
                PTok::Paste,
                PTok::Arg {
                    index: 1,
                    stringize: false
                },
            ]
        );
    }

    #[test]
    fn non_param_words_kept() {
        let m = Macro::function(vec!["a".into()], false, body("a + other"));
        assert!(m.body.contains(&PTok::word("other")));
    }

    #[test]
    fn variadic_tail_index() {
        let m = Macro::function(vec!["fmt".into()], true, body("f(fmt, __VA_ARGS__)"));
        assert!(m.body.contains(&PTok::Arg {
            index: 1,
            stringize: false
        }));
    }
}
