//! C-style macro preprocessor over raw shader text.
//!
//! The preprocessor is a token pump over a stack of sources: the file being
//! processed at the bottom, `#include`d files and macro expansions pushed on
//! top. Macro expansion output is rescanned by the same loop, guarded
//! against re-expanding any macro already on the stack, which is what makes
//! `#define X X` terminate with a literal `X`.
//!
//! Directive failures are routed through an optional listener; without one,
//! the first directive error aborts the run. Everything the preprocessor
//! does not understand (`#version`, `#extension`, vendor pragmas) passes
//! through verbatim, so the GLSL front-end still sees those lines.

mod eval;
mod macros;
mod token;

pub use macros::{Macro, VA_ARGS};
pub use token::{PLexer, PTok};

use crate::error::DirectiveError;
use crate::{FastHashMap, FastHashSet};
use token::{stringize, tokens_to_text};

/// Result of one preprocessor run.
#[derive(Debug, Default)]
pub struct PreprocessOutput {
    pub text: String,
    /// Pre-definition keys this source actually consulted; drives targeted
    /// recompilation.
    pub dependencies: FastHashSet<String>,
    /// Ids of every `#include` that was resolved.
    pub includes: FastHashSet<String>,
    /// Macros defined or redefined during the run, body text keyed by the
    /// pre-definition key for seeded macros and the macro name otherwise,
    /// so re-exports land where dependents track them.
    pub exported: FastHashMap<String, String>,
}

/// Per-nesting-level conditional state. `active` already folds the parent
/// chain in; `taken` remembers whether any branch of this chain has run,
/// which is what `#elif` needs.
struct Cond {
    parent_active: bool,
    active: bool,
    taken: bool,
    saw_else: bool,
}

enum Frame {
    Text {
        tokens: Vec<(PTok, u32)>,
        pos: usize,
        file: String,
        /// `#line` adjustment applied to reported line numbers.
        line_offset: i64,
        /// Line of the most recently consumed token.
        line: u32,
    },
    Expansion {
        tokens: Vec<PTok>,
        pos: usize,
        /// Macro being expanded; empty for argument pre-expansion frames.
        name: String,
    },
}

pub struct Preprocessor<'a> {
    macros: FastHashMap<String, Macro>,
    /// Macro name to the pre-definition key it was seeded from.
    seeded: FastHashMap<String, String>,
    /// Macro body texts at the start of the run, for the re-export diff.
    snapshot: FastHashMap<String, String>,
    dependencies: FastHashSet<String>,
    includes: FastHashSet<String>,
    resolver: Option<&'a dyn Fn(&str) -> Option<String>>,
    listener: Option<&'a mut dyn FnMut(DirectiveError)>,
    counter: u32,

    frames: Vec<Frame>,
    conds: Vec<Cond>,
    /// Frames below this index belong to an enclosing argument
    /// pre-expansion and must not be popped by the current one.
    barrier: usize,
    out: String,
    at_line_start: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new() -> Self {
        Self {
            macros: FastHashMap::default(),
            seeded: FastHashMap::default(),
            snapshot: FastHashMap::default(),
            dependencies: FastHashSet::default(),
            includes: FastHashSet::default(),
            resolver: None,
            listener: None,
            counter: 0,
            frames: Vec::new(),
            conds: Vec::new(),
            barrier: 0,
            out: String::new(),
            at_line_start: true,
        }
    }

    /// Resolves `#include` ids to source text.
    pub fn with_resolver(mut self, resolver: &'a dyn Fn(&str) -> Option<String>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Receives directive errors instead of aborting the run on the first
    /// one.
    pub fn with_listener(mut self, listener: &'a mut dyn FnMut(DirectiveError)) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Defines an object-like macro before the run, e.g. a static
    /// pre-definition. An empty value defines the name with an empty body.
    pub fn define(&mut self, name: &str, value: &str) {
        let body: Vec<PTok> = PLexer::run(value).into_iter().map(|(t, _)| t).collect();
        self.macros.insert(name.to_string(), Macro::object(body));
    }

    /// Defines a macro tied to a pre-definition key: any use of `name`
    /// records `key` in the output dependency set.
    pub fn seed(&mut self, key: &str, name: &str, value: &str) {
        self.define(name, value);
        self.seeded.insert(name.to_string(), key.to_string());
    }

    /// Ties `name` to a key without defining it, so `#ifdef name` on an
    /// unset definition still records the dependency.
    pub fn seed_absent(&mut self, key: &str, name: &str) {
        self.seeded.insert(name.to_string(), key.to_string());
    }

    pub fn run(mut self, source: &str, file: &str) -> Result<PreprocessOutput, DirectiveError> {
        self.snapshot = self
            .macros
            .iter()
            .map(|(name, mac)| (name.clone(), mac.body_text()))
            .collect();
        self.frames.push(Frame::Text {
            tokens: PLexer::run(source),
            pos: 0,
            file: file.to_string(),
            line_offset: 0,
            line: 1,
        });

        while let Some(tok) = self.raw_token() {
            if tok == PTok::Punct("#") && self.at_line_start && self.in_text_frame() {
                self.directive()?;
                continue;
            }
            match tok {
                PTok::Newline => self.at_line_start = true,
                PTok::Whitespace => {}
                _ => self.at_line_start = false,
            }
            if !self.active() {
                // inactive code is skipped, newlines kept for line structure
                if tok == PTok::Newline {
                    self.out.push('\n');
                }
                continue;
            }
            match tok {
                PTok::Word(name) => {
                    if self.maybe_expand(&name)? {
                        continue;
                    }
                    self.out.push_str(&name);
                }
                other => {
                    use std::fmt::Write as _;
                    let _ = write!(self.out, "{other}");
                }
            }
        }

        if !self.conds.is_empty() {
            self.report("unterminated conditional directive")?;
        }

        let mut exported = FastHashMap::default();
        for (name, mac) in &self.macros {
            let text = mac.body_text();
            if self.snapshot.get(name) != Some(&text) {
                let key = self.seeded.get(name).unwrap_or(name);
                exported.insert(key.clone(), text);
            }
        }
        Ok(PreprocessOutput {
            text: self.out,
            dependencies: self.dependencies,
            includes: self.includes,
            exported,
        })
    }

    fn active(&self) -> bool {
        self.conds.last().map_or(true, |c| c.active)
    }

    fn in_text_frame(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Text { .. }))
    }

    /// Pops the next token, discarding exhausted frames first. Never reads
    /// or pops a frame below the current barrier.
    fn raw_token(&mut self) -> Option<PTok> {
        loop {
            if self.frames.len() <= self.barrier {
                return None;
            }
            let exhausted = match self.frames.last() {
                None => return None,
                Some(Frame::Text { tokens, pos, .. }) => *pos >= tokens.len(),
                Some(Frame::Expansion { tokens, pos, .. }) => *pos >= tokens.len(),
            };
            if exhausted {
                self.frames.pop();
                continue;
            }
            match self.frames.last_mut().unwrap() {
                Frame::Text {
                    tokens, pos, line, ..
                } => {
                    let (tok, tok_line) = tokens[*pos].clone();
                    *pos += 1;
                    *line = tok_line;
                    return Some(tok);
                }
                Frame::Expansion { tokens, pos, .. } => {
                    let tok = tokens[*pos].clone();
                    *pos += 1;
                    return Some(tok);
                }
            }
        }
    }

    /// Next non-space token without consuming anything, looking through
    /// frame boundaries down to the barrier.
    fn peek_nonspace(&self) -> Option<&PTok> {
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            if depth < self.barrier {
                break;
            }
            let found = match frame {
                Frame::Text { tokens, pos, .. } => {
                    tokens[*pos..].iter().map(|(t, _)| t).find(|t| !t.is_space())
                }
                Frame::Expansion { tokens, pos, .. } => {
                    tokens[*pos..].iter().find(|t| !t.is_space())
                }
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    fn current_file(&self) -> String {
        for frame in self.frames.iter().rev() {
            if let Frame::Text { file, .. } = frame {
                return file.clone();
            }
        }
        String::new()
    }

    fn current_line(&self) -> u32 {
        for frame in self.frames.iter().rev() {
            if let Frame::Text {
                line, line_offset, ..
            } = frame
            {
                return (i64::from(*line) + line_offset).max(0) as u32;
            }
        }
        0
    }

    /// Reports through the listener, or fails the run when there is none.
    fn report(&mut self, message: impl Into<String>) -> Result<(), DirectiveError> {
        let error = DirectiveError {
            file: self.current_file(),
            line: self.current_line(),
            column: 0,
            message: message.into(),
        };
        match self.listener.as_mut() {
            Some(listener) => {
                listener(error);
                Ok(())
            }
            None => Err(error),
        }
    }

    /// True when the macro name is anywhere on the expansion stack.
    fn is_expanding(&self, name: &str) -> bool {
        self.frames.iter().any(|f| match f {
            Frame::Expansion { name: n, .. } => n == name,
            Frame::Text { .. } => false,
        })
    }

    /// Attempts macro or builtin expansion of `name`. Returns true when the
    /// word was handled (tokens pushed or output written).
    fn maybe_expand(&mut self, name: &str) -> Result<bool, DirectiveError> {
        if let Some(key) = self.seeded.get(name) {
            let key = key.clone();
            self.dependencies.insert(key);
        }

        match name {
            "__LINE__" => {
                use std::fmt::Write as _;
                let _ = write!(self.out, "{}", self.current_line());
                return Ok(true);
            }
            "__FILE__" => {
                use std::fmt::Write as _;
                let _ = write!(self.out, "\"{}\"", self.current_file());
                return Ok(true);
            }
            "__COUNTER__" => {
                use std::fmt::Write as _;
                let _ = write!(self.out, "{}", self.counter);
                self.counter += 1;
                return Ok(true);
            }
            _ => {}
        }

        let Some(mac) = self.macros.get(name) else {
            return Ok(false);
        };
        if self.is_expanding(name) {
            return Ok(false);
        }
        let mac = mac.clone();

        let expansion = if mac.is_function_like() {
            if self.peek_nonspace() != Some(&PTok::Punct("(")) {
                // function-like macro without an argument list stays as is
                return Ok(false);
            }
            let raw_args = self.collect_args(&mac, name)?;
            let mut expanded_args = Vec::with_capacity(raw_args.len());
            for arg in &raw_args {
                expanded_args.push(self.expand_fragment(arg.clone())?);
            }
            substitute(&mac, &raw_args, &expanded_args)
        } else {
            resolve_pastes(mac.body.clone())
        };

        self.frames.push(Frame::Expansion {
            tokens: expansion,
            pos: 0,
            name: name.to_string(),
        });
        Ok(true)
    }

    /// Consumes a balanced-paren argument list, splitting on top-level
    /// commas and merging the variadic tail back together.
    fn collect_args(&mut self, mac: &Macro, name: &str) -> Result<Vec<Vec<PTok>>, DirectiveError> {
        // consume through the opening paren
        loop {
            match self.raw_token() {
                Some(PTok::Punct("(")) => break,
                Some(t) if t.is_space() => continue,
                _ => unreachable!("peeked '(' before collecting arguments"),
            }
        }

        let mut args: Vec<Vec<PTok>> = vec![Vec::new()];
        let mut depth = 1usize;
        loop {
            let Some(tok) = self.raw_token() else {
                self.report(format!("unterminated invocation of macro '{name}'"))?;
                break;
            };
            match tok {
                PTok::Punct("(") => {
                    depth += 1;
                    args.last_mut().unwrap().push(tok);
                }
                PTok::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    args.last_mut().unwrap().push(tok);
                }
                PTok::Punct(",") if depth == 1 => args.push(Vec::new()),
                PTok::Newline => args.last_mut().unwrap().push(PTok::Whitespace),
                tok => args.last_mut().unwrap().push(tok),
            }
        }
        for arg in &mut args {
            while arg.first().is_some_and(PTok::is_space) {
                arg.remove(0);
            }
            while arg.last().is_some_and(PTok::is_space) {
                arg.pop();
            }
        }

        let declared = mac.params.as_ref().map_or(0, Vec::len);
        if args.len() == 1 && args[0].is_empty() && declared == 0 && !mac.variadic {
            args.clear();
        }
        if mac.variadic {
            // everything past the declared parameters joins into one
            // argument, commas restored
            if args.len() > declared + 1 {
                let tail = args.split_off(declared);
                let mut merged = Vec::new();
                for (i, part) in tail.into_iter().enumerate() {
                    if i > 0 {
                        merged.push(PTok::Punct(","));
                        merged.push(PTok::Whitespace);
                    }
                    merged.extend(part);
                }
                args.push(merged);
            }
        } else if args.len() > declared {
            self.report(format!(
                "macro '{name}' expects {declared} arguments, found {}",
                args.len()
            ))?;
            args.truncate(declared);
        }
        while args.len() < mac.arity() {
            args.push(Vec::new());
        }
        Ok(args)
    }

    /// Fully expands a token list in its own sub-context, used for macro
    /// argument pre-expansion.
    fn expand_fragment(&mut self, tokens: Vec<PTok>) -> Result<Vec<PTok>, DirectiveError> {
        let saved_barrier = self.barrier;
        self.barrier = self.frames.len();
        self.frames.push(Frame::Expansion {
            tokens,
            pos: 0,
            name: String::new(),
        });

        let mut out = Vec::new();
        let result = loop {
            let Some(tok) = self.raw_token() else {
                break Ok(());
            };
            match tok {
                PTok::Word(name) => {
                    // builtins write to `out`, so capture and restore it
                    let written = self.out.len();
                    match self.maybe_expand(&name) {
                        Ok(true) => {
                            if self.out.len() > written {
                                let text = self.out.split_off(written);
                                out.extend(
                                    PLexer::run(&text).into_iter().map(|(t, _)| t),
                                );
                            }
                        }
                        Ok(false) => out.push(PTok::Word(name)),
                        Err(e) => break Err(e),
                    }
                }
                tok => out.push(tok),
            }
        };

        // drop whatever of the fragment remains after an error
        while self.frames.len() > self.barrier {
            self.frames.pop();
        }
        self.barrier = saved_barrier;
        result.map(|_| out)
    }

    /// Reads the rest of the current directive line from the text frame,
    /// excluding the terminating newline.
    fn directive_line(&mut self) -> Vec<PTok> {
        let mut tokens = Vec::new();
        let Some(Frame::Text {
            tokens: source,
            pos,
            line,
            ..
        }) = self.frames.last_mut()
        else {
            return tokens;
        };
        while *pos < source.len() {
            let (tok, tok_line) = source[*pos].clone();
            *pos += 1;
            *line = tok_line;
            if tok == PTok::Newline {
                break;
            }
            tokens.push(tok);
        }
        tokens
    }

    fn directive(&mut self) -> Result<(), DirectiveError> {
        let line = self.directive_line();
        self.out.push('\n');
        self.at_line_start = true;

        let mut iter = line.iter().filter(|t| !t.is_space());
        let name = match iter.next() {
            Some(PTok::Word(name)) => name.clone(),
            // a lone '#' line is legal and ignored
            None => return Ok(()),
            Some(_) => {
                if self.active() {
                    self.pass_through(&line);
                }
                return Ok(());
            }
        };
        let rest: Vec<PTok> = {
            let mut rest = line.clone();
            // drop leading space and the directive name
            while rest.first().is_some_and(PTok::is_space) {
                rest.remove(0);
            }
            rest.remove(0);
            while rest.first().is_some_and(PTok::is_space) {
                rest.remove(0);
            }
            rest
        };

        match name.as_str() {
            "if" => {
                let parent = self.active();
                let value = if parent {
                    self.eval_condition(&rest)?
                } else {
                    false
                };
                self.conds.push(Cond {
                    parent_active: parent,
                    active: parent && value,
                    taken: parent && value,
                    saw_else: false,
                });
            }
            "ifdef" | "ifndef" => {
                let parent = self.active();
                let value = match first_word(&rest) {
                    Some(word) => {
                        let defined = self.check_defined(word);
                        if name == "ifdef" {
                            defined
                        } else {
                            !defined
                        }
                    }
                    None => {
                        self.report(format!("#{name} requires a macro name"))?;
                        false
                    }
                };
                self.conds.push(Cond {
                    parent_active: parent,
                    active: parent && value,
                    taken: parent && value,
                    saw_else: false,
                });
            }
            "elif" => {
                let state = self
                    .conds
                    .last()
                    .map(|c| (c.parent_active, c.taken, c.saw_else));
                match state {
                    None => self.report("#elif without #if")?,
                    Some((_, _, true)) => self.report("#elif after #else")?,
                    Some((parent, taken, false)) => {
                        let value = if parent && !taken {
                            self.eval_condition(&rest)?
                        } else {
                            false
                        };
                        let c = self.conds.last_mut().unwrap();
                        c.active = value;
                        c.taken |= value;
                    }
                }
            }
            "else" => {
                let saw_else = self.conds.last().map(|c| c.saw_else);
                match saw_else {
                    None => self.report("#else without #if")?,
                    Some(true) => self.report("duplicate #else")?,
                    Some(false) => {
                        let c = self.conds.last_mut().unwrap();
                        c.saw_else = true;
                        c.active = c.parent_active && !c.taken;
                        c.taken = true;
                    }
                }
            }
            "endif" => {
                if self.conds.pop().is_none() {
                    self.report("#endif without #if")?;
                }
            }
            _ if !self.active() => {}
            "define" => self.directive_define(&rest)?,
            "undef" => match first_word(&rest) {
                Some(word) => {
                    self.macros.remove(word);
                }
                None => self.report("#undef requires a macro name")?,
            },
            "include" => self.directive_include(&rest)?,
            "error" => {
                let message = tokens_to_text(&rest);
                self.report(format!("#error {message}"))?;
            }
            "warning" => {
                let message = tokens_to_text(&rest);
                log::warn!("{}:{}: #warning {message}", self.current_file(), self.current_line());
                let error = DirectiveError {
                    file: self.current_file(),
                    line: self.current_line(),
                    column: 0,
                    message: format!("#warning {message}"),
                };
                if let Some(listener) = self.listener.as_mut() {
                    listener(error);
                }
            }
            "line" => {
                let mut words = rest.iter().filter(|t| !t.is_space());
                if let Some(PTok::Number(text)) = words.next() {
                    if let Some(value) = eval::parse_int(text) {
                        let directive_line = self.current_line() as i64;
                        if let Some(Frame::Text {
                            line_offset, file, ..
                        }) = self.frames.last_mut()
                        {
                            *line_offset += value - directive_line - 1;
                            if let Some(PTok::Str(text)) = words.next() {
                                *file = text.trim_matches('"').to_string();
                            }
                        }
                        return Ok(());
                    }
                }
                self.report("malformed #line directive")?;
            }
            // #version, #extension, #pragma and anything else pass through
            _ => self.pass_through(&line),
        }
        Ok(())
    }

    fn pass_through(&mut self, line: &[PTok]) {
        // replace the newline the directive consumed
        self.out.pop();
        self.out.push('#');
        self.out.push_str(&tokens_to_text(line));
        self.out.push('\n');
    }

    fn check_defined(&mut self, name: &str) -> bool {
        if let Some(key) = self.seeded.get(name) {
            let key = key.clone();
            self.dependencies.insert(key);
        }
        self.macros.contains_key(name)
    }

    /// Evaluates an `#if`/`#elif` expression: `defined` resolved first,
    /// remaining tokens macro-expanded, then fed to the integer evaluator.
    fn eval_condition(&mut self, tokens: &[PTok]) -> Result<bool, DirectiveError> {
        let mut resolved = Vec::with_capacity(tokens.len());
        let mut iter = tokens.iter().filter(|t| !t.is_space()).peekable();
        while let Some(tok) = iter.next() {
            if tok.as_word() == Some("defined") {
                let name = match iter.peek() {
                    Some(PTok::Punct("(")) => {
                        iter.next();
                        let name = iter.next().and_then(|t| t.as_word()).map(str::to_string);
                        if iter.next() != Some(&PTok::Punct(")")) {
                            self.report("expected ')' after defined(")?;
                        }
                        name
                    }
                    _ => iter.next().and_then(|t| t.as_word()).map(str::to_string),
                };
                match name {
                    Some(name) => {
                        let value = self.check_defined(&name);
                        resolved.push(PTok::Number(if value { "1" } else { "0" }.into()));
                    }
                    None => self.report("expected a macro name after 'defined'")?,
                }
            } else {
                resolved.push(tok.clone());
            }
        }

        let expanded = self.expand_fragment(resolved)?;
        let mut diags = Vec::new();
        let value = eval::eval(&expanded, &mut |d| diags.push(d));
        for diag in diags {
            self.report(diag)?;
        }
        match value {
            Ok(value) => Ok(value != 0),
            Err(message) => {
                self.report(message)?;
                Ok(false)
            }
        }
    }

    fn directive_define(&mut self, rest: &[PTok]) -> Result<(), DirectiveError> {
        let Some(PTok::Word(name)) = rest.first() else {
            return self.report("#define requires a macro name");
        };
        let name = name.clone();
        let after_name = &rest[1..];

        // a parameter list only counts when the '(' is immediately adjacent
        let mac = if after_name.first() == Some(&PTok::Punct("(")) {
            let mut pos = 1;
            let mut params = Vec::new();
            let mut variadic = false;
            loop {
                while after_name.get(pos).is_some_and(PTok::is_space) {
                    pos += 1;
                }
                match after_name.get(pos) {
                    Some(PTok::Punct(")")) if params.is_empty() && !variadic => {
                        pos += 1;
                        break;
                    }
                    Some(PTok::Word(param)) if !variadic => {
                        params.push(param.clone());
                        pos += 1;
                    }
                    Some(PTok::Punct("."))
                        if after_name.get(pos + 1) == Some(&PTok::Punct("."))
                            && after_name.get(pos + 2) == Some(&PTok::Punct(".")) =>
                    {
                        variadic = true;
                        pos += 3;
                    }
                    _ => return self.report(format!("malformed parameter list for '{name}'")),
                }
                while after_name.get(pos).is_some_and(PTok::is_space) {
                    pos += 1;
                }
                match after_name.get(pos) {
                    Some(PTok::Punct(",")) if !variadic => pos += 1,
                    Some(PTok::Punct(")")) => {
                        pos += 1;
                        break;
                    }
                    _ => return self.report(format!("malformed parameter list for '{name}'")),
                }
            }
            Macro::function(params, variadic, after_name[pos..].to_vec())
        } else {
            Macro::object(after_name.to_vec())
        };

        self.macros.insert(name, mac);
        Ok(())
    }

    fn directive_include(&mut self, rest: &[PTok]) -> Result<(), DirectiveError> {
        let mut iter = rest.iter().filter(|t| !t.is_space()).peekable();
        let id = match iter.next() {
            Some(PTok::Str(text)) => text.trim_matches('"').to_string(),
            Some(PTok::Punct("<")) => {
                let mut id = String::new();
                for tok in iter.by_ref() {
                    if *tok == PTok::Punct(">") {
                        break;
                    }
                    id.push_str(&tok.to_string());
                }
                id
            }
            _ => return self.report("malformed #include directive"),
        };

        let cycle = self.frames.iter().any(|f| match f {
            Frame::Text { file, .. } => *file == id,
            Frame::Expansion { .. } => false,
        });
        if cycle {
            return self.report(format!("circular include of '{id}'"));
        }

        let resolved = self.resolver.and_then(|r| r(&id));
        match resolved {
            Some(text) => {
                self.includes.insert(id.clone());
                self.frames.push(Frame::Text {
                    tokens: PLexer::run(&text),
                    pos: 0,
                    file: id,
                    line_offset: 0,
                    line: 1,
                });
                Ok(())
            }
            None => self.report(format!("could not resolve include '{id}'")),
        }
    }
}

impl Default for Preprocessor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn first_word(tokens: &[PTok]) -> Option<&str> {
    tokens.iter().find_map(|t| t.as_word())
}

/// Builds the expansion token list for a function-like macro: argument
/// markers replaced, `#` stringized from raw argument text, `##` resolved
/// over the substituted output.
fn substitute(mac: &Macro, raw_args: &[Vec<PTok>], expanded_args: &[Vec<PTok>]) -> Vec<PTok> {
    let mut out = Vec::with_capacity(mac.body.len());
    for token in &mac.body {
        match token {
            &PTok::Arg {
                index,
                stringize: true,
            } => {
                let raw: &[PTok] = raw_args.get(index).map_or(&[], Vec::as_slice);
                out.push(PTok::Str(stringize(raw)));
            }
            &PTok::Arg {
                index,
                stringize: false,
            } => {
                out.extend(expanded_args.get(index).cloned().unwrap_or_default());
            }
            other => out.push(other.clone()),
        }
    }
    resolve_pastes(out)
}

/// Resolves `##` markers by concatenating the adjacent token texts and
/// re-lexing the result.
fn resolve_pastes(mut tokens: Vec<PTok>) -> Vec<PTok> {
    while let Some(at) = tokens.iter().position(|t| *t == PTok::Paste) {
        let mut left_at = at;
        while left_at > 0 && tokens[left_at - 1].is_space() {
            left_at -= 1;
        }
        let left = (left_at > 0).then(|| tokens[left_at - 1].to_string());
        let mut right_at = at + 1;
        while tokens.get(right_at).is_some_and(PTok::is_space) {
            right_at += 1;
        }
        let right = tokens.get(right_at).map(ToString::to_string);

        let start = if left.is_some() { left_at - 1 } else { at };
        let end = if right.is_some() { right_at + 1 } else { at + 1 };
        let pasted = format!(
            "{}{}",
            left.unwrap_or_default(),
            right.unwrap_or_default()
        );
        let replacement: Vec<PTok> = PLexer::run(&pasted).into_iter().map(|(t, _)| t).collect();
        tokens.splice(start..end, replacement);
    }
    tokens
}
