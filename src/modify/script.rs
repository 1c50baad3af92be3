//! Modifier script parsing.
//!
//! A script is plain text: a run of header directives followed by a GLSL
//! body. Recognized headers:
//!
//! ```text
//! #priority 100
//! #inject before_main
//! #replace
//! #output out vec3 worldPos;
//! ```
//!
//! `#priority` orders scripts for the same target (lower runs first,
//! default 1000). `#inject` picks the splice point for the body.
//! `#replace` discards the target's declarations and substitutes the body.
//! `#output` declares an `out` variable the body introduces, which the
//! registry forwards to the next pipeline stage as an `in` declaration.

use crate::error::ScriptError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectionPoint {
    BeforeDeclarations,
    AfterDeclarations,
    BeforeMain,
    AfterMain,
    BeforeFunctions,
    AfterFunctions,
}

impl InjectionPoint {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "before_declarations" => Self::BeforeDeclarations,
            "after_declarations" => Self::AfterDeclarations,
            "before_main" => Self::BeforeMain,
            "after_main" => Self::AfterMain,
            "before_functions" => Self::BeforeFunctions,
            "after_functions" => Self::AfterFunctions,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModifierKind {
    Simple { point: InjectionPoint },
    Replace,
    /// Synthesized from another stage's `#output`; never parsed from text.
    Input,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModifierScript {
    /// Registration name, used in diagnostics.
    pub name: String,
    pub priority: i32,
    pub kind: ModifierKind,
    /// Declarations this script adds as stage outputs.
    pub outputs: Vec<String>,
    /// GLSL body, possibly containing `$0..$n` placeholders.
    pub body: String,
}

pub const DEFAULT_PRIORITY: i32 = 1000;

impl ModifierScript {
    pub fn parse(name: &str, text: &str) -> Result<Self, ScriptError> {
        let error = |message: String| ScriptError {
            script: name.to_string(),
            message,
        };

        let mut priority = DEFAULT_PRIORITY;
        let mut point = None;
        let mut replace = false;
        let mut outputs = Vec::new();
        let mut body_start = 0;

        for line in text.lines() {
            let trimmed = line.trim();
            let header = trimmed.strip_prefix('#').and_then(|rest| {
                let (word, tail) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, ""));
                matches!(word, "priority" | "inject" | "replace" | "output")
                    .then(|| (word, tail.trim()))
            });
            let Some((word, value)) = header else {
                // first non-header line starts the body
                break;
            };
            body_start += line.len() + 1;
            match word {
                "priority" => {
                    priority = value
                        .parse()
                        .map_err(|_| error(format!("invalid priority '{value}'")))?;
                }
                "inject" => {
                    point = Some(
                        InjectionPoint::parse(value)
                            .ok_or_else(|| error(format!("unknown injection point '{value}'")))?,
                    );
                }
                "replace" => replace = true,
                "output" => {
                    if value.is_empty() {
                        return Err(error("#output requires a declaration".to_string()));
                    }
                    outputs.push(value.to_string());
                }
                _ => unreachable!(),
            }
        }

        let body = text
            .get(body_start.min(text.len())..)
            .unwrap_or("")
            .to_string();
        if body.trim().is_empty() {
            return Err(error("script has no body".to_string()));
        }
        if replace && point.is_some() {
            return Err(error("#replace and #inject are mutually exclusive".to_string()));
        }

        let kind = if replace {
            ModifierKind::Replace
        } else {
            ModifierKind::Simple {
                point: point.unwrap_or(InjectionPoint::AfterDeclarations),
            }
        };
        Ok(Self {
            name: name.to_string(),
            priority,
            kind,
            outputs,
            body,
        })
    }

    /// The synthetic modifier injected into the next stage for one of this
    /// script's outputs: the declaration with `out` rewritten to `in`.
    pub fn input_counterpart(&self, output: &str) -> ModifierScript {
        let mut decl = rewrite_out_to_in(output);
        if !decl.trim_end().ends_with(';') {
            decl.push(';');
        }
        decl.push('\n');
        ModifierScript {
            name: format!("{}#input", self.name),
            priority: self.priority,
            kind: ModifierKind::Input,
            outputs: Vec::new(),
            body: decl,
        }
    }
}

fn rewrite_out_to_in(decl: &str) -> String {
    let mut parts: Vec<&str> = decl.split_whitespace().collect();
    if let Some(out_at) = parts.iter().position(|w| *w == "out") {
        parts[out_at] = "in";
    }
    parts.join(" ")
}

/// Replaces `$0..$n` placeholders with the given arguments. Unknown
/// indices are left in place for the parser to report.
pub fn fill_placeholders(body: &str, args: &[String]) -> String {
    if !body.contains('$') {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while chars.peek().is_some_and(char::is_ascii_digit) {
            digits.push(chars.next().unwrap());
        }
        match digits.parse::<usize>().ok().and_then(|i| args.get(i)) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{fill_placeholders, InjectionPoint, ModifierKind, ModifierScript};

    #[test]
    fn headers_and_body() {
        let script = ModifierScript::parse(
            "fx.fsh",
            "#priority 50\n#inject before_main\nvoid extra() {}\n",
        )
        .unwrap();
        assert_eq!(script.priority, 50);
        assert_eq!(
            script.kind,
            ModifierKind::Simple {
                point: InjectionPoint::BeforeMain
            }
        );
        assert_eq!(script.body, "void extra() {}\n");
    }

    #[test]
    fn defaults() {
        let script = ModifierScript::parse("fx.fsh", "int x;\n").unwrap();
        assert_eq!(script.priority, super::DEFAULT_PRIORITY);
        assert_eq!(
            script.kind,
            ModifierKind::Simple {
                point: InjectionPoint::AfterDeclarations
            }
        );
    }

    #[test]
    fn glsl_directives_are_not_headers() {
        // a body starting with #version must not be eaten as a header
        let script = ModifierScript::parse("fx.fsh", "#replace\n#version 450\nvoid main() {}\n")
            .unwrap();
        assert!(script.body.starts_with("#version 450"));
    }

    #[test]
    fn replace_and_inject_conflict() {
        assert!(
            ModifierScript::parse("fx.fsh", "#replace\n#inject before_main\nint x;\n").is_err()
        );
    }

    #[test]
    fn empty_body_rejected() {
        assert!(ModifierScript::parse("fx.fsh", "#priority 5\n").is_err());
    }

    #[test]
    fn output_rewrites_to_input() {
        let script = ModifierScript::parse(
            "fx.vsh",
            "#output out vec3 normal;\nout vec3 normal;\nvoid main() {}\n",
        )
        .unwrap();
        assert_eq!(script.outputs, vec!["out vec3 normal;"]);
        let input = script.input_counterpart(&script.outputs[0]);
        assert_eq!(input.body.trim(), "in vec3 normal;");
        assert_eq!(input.kind, ModifierKind::Input);
    }

    #[test]
    fn placeholders() {
        let args = vec!["position".to_string(), "vec3".to_string()];
        assert_eq!(
            fill_placeholders("$1 value = $0;", &args),
            "vec3 value = position;"
        );
        assert_eq!(fill_placeholders("$9 stays", &args), "$9 stays");
        assert_eq!(fill_placeholders("no dollars", &args), "no dollars");
    }
}
